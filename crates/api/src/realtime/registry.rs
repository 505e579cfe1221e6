//! Connection registry for server-to-client push.
//!
//! Holds at most one open stream per user; a new registration replaces the
//! old one. Delivery is best-effort and at-most-once: a failed write drops
//! the connection and the frame is not retried or queued.
//!
//! Event writes never wait on a peer. A stream whose buffer is full is a
//! slow reader and is dropped, so one stalled client cannot hold up
//! delivery to anyone else. Only the `connected` write and heartbeats,
//! which run on the subscriber's own task, wait up to the write timeout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::Utc;
use domain::models::event::ConnectedPayload;
use domain::models::{EventFrame, PushEvent};
use metrics::{counter, gauge};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use uuid::Uuid;

/// A frame written to a connected stream.
#[derive(Debug, Clone, PartialEq)]
pub enum PushFrame {
    Event(EventFrame),
    /// Keep-alive with no payload.
    Heartbeat,
}

/// Why a frame did not reach a connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("user {0} is not connected")]
    NotConnected(Uuid),

    #[error("connection closed")]
    Closed,

    #[error("write timed out after {0:?}")]
    TimedOut(Duration),

    #[error("reader is not keeping up")]
    SlowReader,

    #[error("failed to encode event: {0}")]
    Encode(String),
}

impl DeliveryError {
    fn reason(&self) -> &'static str {
        match self {
            DeliveryError::NotConnected(_) => "not_connected",
            DeliveryError::Closed => "closed",
            DeliveryError::TimedOut(_) => "timeout",
            DeliveryError::SlowReader => "slow_reader",
            DeliveryError::Encode(_) => "encode",
        }
    }
}

/// Registry timing settings.
#[derive(Debug, Clone, Copy)]
pub struct RegistrySettings {
    pub heartbeat_interval: Duration,
    pub write_timeout: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            write_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
struct Connection {
    id: u64,
    sender: mpsc::Sender<PushFrame>,
}

#[derive(Debug)]
struct Inner {
    connections: Mutex<HashMap<Uuid, Connection>>,
    next_id: AtomicU64,
    settings: RegistrySettings,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Connection>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The sender for `user_id` if it still belongs to `connection_id`.
    fn sender_for(&self, user_id: Uuid, connection_id: u64) -> Option<mpsc::Sender<PushFrame>> {
        self.lock()
            .get(&user_id)
            .filter(|c| c.id == connection_id)
            .map(|c| c.sender.clone())
    }

    fn remove_connection(&self, user_id: Uuid, connection_id: u64) -> bool {
        let mut connections = self.lock();
        let removed = match connections.get(&user_id) {
            Some(c) if c.id == connection_id => connections.remove(&user_id).is_some(),
            _ => false,
        };
        gauge!("sideline_push_connections").set(connections.len() as f64);
        removed
    }

    /// Waits up to the write timeout for buffer space.
    async fn write(
        &self,
        sender: &mpsc::Sender<PushFrame>,
        frame: PushFrame,
    ) -> Result<(), DeliveryError> {
        let timeout = self.settings.write_timeout;
        sender.send_timeout(frame, timeout).await.map_err(|e| match e {
            SendTimeoutError::Timeout(_) => DeliveryError::TimedOut(timeout),
            SendTimeoutError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Writes without waiting; a full buffer is a slow reader.
    fn try_write(sender: &mpsc::Sender<PushFrame>, frame: PushFrame) -> Result<(), DeliveryError> {
        sender.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::SlowReader,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Maps each user to their single open push stream.
///
/// Cloning is cheap and every clone shares the same map.
#[derive(Debug, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<Inner>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(RegistrySettings::default())
    }
}

impl ConnectionRegistry {
    pub fn new(settings: RegistrySettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                connections: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                settings,
            }),
        }
    }

    /// Registers `sender` as the stream for `user_id`.
    ///
    /// Writes a `connected` event first; if that write fails nothing is
    /// stored. Any previous stream for the user is superseded. Starts the
    /// heartbeat for the new connection and returns its id.
    pub async fn register(
        &self,
        user_id: Uuid,
        sender: mpsc::Sender<PushFrame>,
    ) -> Result<u64, DeliveryError> {
        let connected = PushEvent::Connected(ConnectedPayload {
            user_id,
            connected_at: Utc::now(),
        });
        let frame = encode(&connected)?;
        self.inner.write(&sender, PushFrame::Event(frame)).await?;

        let connection_id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let total = {
            let mut connections = self.inner.lock();
            let previous = connections.insert(
                user_id,
                Connection {
                    id: connection_id,
                    sender,
                },
            );
            if previous.is_some() {
                tracing::debug!(user_id = %user_id, "Superseded existing push connection");
            }
            connections.len()
        };
        gauge!("sideline_push_connections").set(total as f64);

        spawn_heartbeat(Arc::downgrade(&self.inner), user_id, connection_id);

        tracing::info!(
            user_id = %user_id,
            connection_id = connection_id,
            "Push connection registered"
        );
        Ok(connection_id)
    }

    /// Removes whatever stream `user_id` has. Idempotent.
    pub fn unregister(&self, user_id: Uuid) -> bool {
        let mut connections = self.inner.lock();
        let removed = connections.remove(&user_id).is_some();
        gauge!("sideline_push_connections").set(connections.len() as f64);
        if removed {
            tracing::info!(user_id = %user_id, "Push connection unregistered");
        }
        removed
    }

    /// Removes the stream for `user_id` only if it is still `connection_id`.
    ///
    /// A superseded stream closing must not evict its replacement.
    pub fn remove_connection(&self, user_id: Uuid, connection_id: u64) -> bool {
        let removed = self.inner.remove_connection(user_id, connection_id);
        if removed {
            tracing::info!(
                user_id = %user_id,
                connection_id = connection_id,
                "Push connection closed"
            );
        }
        removed
    }

    /// Writes `event` to `user_id`'s stream.
    ///
    /// Returns `false` when the user is not connected or the write fails;
    /// a failed write also drops the connection.
    pub fn send_to_user(&self, user_id: Uuid, event: &PushEvent) -> bool {
        let frame = match encode(event) {
            Ok(frame) => frame,
            Err(e) => {
                record_failure(&e);
                return false;
            }
        };
        self.deliver(user_id, frame).is_ok()
    }

    /// Writes `event` to every connected stream.
    ///
    /// Returns the number of successful writes.
    pub fn broadcast(&self, event: &PushEvent) -> usize {
        let users: Vec<Uuid> = self.inner.lock().keys().copied().collect();
        self.fan_out(users, event)
    }

    /// Writes `event` to each listed user that is connected.
    ///
    /// Duplicate ids receive one write. Returns the number of successful
    /// writes.
    pub fn send_to_users(&self, user_ids: &[Uuid], event: &PushEvent) -> usize {
        let mut users = user_ids.to_vec();
        users.sort_unstable();
        users.dedup();
        self.fan_out(users, event)
    }

    /// Ids of the connected users, sorted.
    pub fn online_users(&self) -> Vec<Uuid> {
        let mut users: Vec<Uuid> = self.inner.lock().keys().copied().collect();
        users.sort_unstable();
        users
    }

    pub fn is_connected(&self, user_id: Uuid) -> bool {
        self.inner.lock().contains_key(&user_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn fan_out(&self, users: Vec<Uuid>, event: &PushEvent) -> usize {
        if users.is_empty() {
            return 0;
        }
        let frame = match encode(event) {
            Ok(frame) => frame,
            Err(e) => {
                record_failure(&e);
                return 0;
            }
        };

        users
            .into_iter()
            .filter(|user_id| self.deliver(*user_id, frame.clone()).is_ok())
            .count()
    }

    fn deliver(&self, user_id: Uuid, frame: EventFrame) -> Result<(), DeliveryError> {
        let event_type = frame.event_type.clone();
        let connection = self.inner.lock().get(&user_id).cloned();
        let Some(connection) = connection else {
            let err = DeliveryError::NotConnected(user_id);
            record_failure(&err);
            return Err(err);
        };

        match Inner::try_write(&connection.sender, PushFrame::Event(frame)) {
            Ok(()) => {
                counter!("sideline_push_delivered_total", "event" => event_type).increment(1);
                Ok(())
            }
            Err(e) => {
                record_failure(&e);
                if e == DeliveryError::SlowReader {
                    counter!("sideline_push_dropped_total", "reason" => "slow_reader").increment(1);
                }
                tracing::warn!(
                    user_id = %user_id,
                    connection_id = connection.id,
                    event_type = %event_type,
                    error = %e,
                    "Push write failed, dropping connection"
                );
                self.inner.remove_connection(user_id, connection.id);
                Err(e)
            }
        }
    }
}

fn encode(event: &PushEvent) -> Result<EventFrame, DeliveryError> {
    event.to_frame(Utc::now()).map_err(|e| {
        tracing::error!(event_type = event.event_type(), error = %e, "Failed to encode push event");
        DeliveryError::Encode(e.to_string())
    })
}

fn record_failure(err: &DeliveryError) {
    counter!("sideline_push_failed_total", "reason" => err.reason()).increment(1);
}

/// Sends heartbeats until the connection is gone, replaced, or a write fails.
fn spawn_heartbeat(inner: Weak<Inner>, user_id: Uuid, connection_id: u64) {
    let Some(interval) = inner.upgrade().map(|i| i.settings.heartbeat_interval) else {
        return;
    };

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let Some(inner) = inner.upgrade() else { break };
            let Some(sender) = inner.sender_for(user_id, connection_id) else {
                break;
            };

            if let Err(e) = inner.write(&sender, PushFrame::Heartbeat).await {
                record_failure(&e);
                tracing::debug!(
                    user_id = %user_id,
                    connection_id = connection_id,
                    error = %e,
                    "Heartbeat failed, dropping connection"
                );
                inner.remove_connection(user_id, connection_id);
                break;
            }
        }
    });
}
