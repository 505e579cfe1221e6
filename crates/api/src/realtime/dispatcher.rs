//! Delivery loop between the domain services and the connection registry.
//!
//! Services publish dispatches onto a bounded queue without waiting. One
//! consumer task drains the queue in order, so events from a single
//! publisher reach each recipient in publish order.

use domain::services::{DeliveryTarget, Dispatch, Notifier, PublishResult};
use metrics::counter;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use super::registry::ConnectionRegistry;

/// `Notifier` backed by the connection registry.
#[derive(Debug, Clone)]
pub struct RegistryNotifier {
    queue: mpsc::Sender<Dispatch>,
    registry: ConnectionRegistry,
}

impl RegistryNotifier {
    /// Starts the delivery loop and returns the notifier feeding it.
    ///
    /// The loop exits once every clone of the notifier is dropped.
    pub fn spawn(registry: ConnectionRegistry, capacity: usize) -> (Self, JoinHandle<()>) {
        let (queue, receiver) = mpsc::channel(capacity);
        let handle = tokio::spawn(delivery_loop(receiver, registry.clone()));
        (Self { queue, registry }, handle)
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }
}

impl Notifier for RegistryNotifier {
    fn publish(&self, dispatch: Dispatch) -> PublishResult {
        match self.queue.try_send(dispatch) {
            Ok(()) => PublishResult::Queued,
            Err(TrySendError::Full(dispatch)) => {
                counter!("sideline_push_dropped_total", "reason" => "queue_full").increment(1);
                PublishResult::Dropped(format!(
                    "delivery queue full, dropped {}",
                    dispatch.event.event_type()
                ))
            }
            Err(TrySendError::Closed(_)) => {
                counter!("sideline_push_dropped_total", "reason" => "stopped").increment(1);
                PublishResult::Dropped("delivery loop stopped".to_string())
            }
        }
    }

    fn online_count(&self) -> usize {
        self.registry.len()
    }
}

async fn delivery_loop(mut receiver: mpsc::Receiver<Dispatch>, registry: ConnectionRegistry) {
    tracing::info!("Push delivery loop started");
    while let Some(dispatch) = receiver.recv().await {
        deliver(&registry, dispatch);
    }
    tracing::info!("Push delivery loop stopped");
}

/// Delivers one dispatch and returns the number of successful writes.
///
/// Never waits on a peer, so a stalled stream cannot hold up later
/// dispatches.
pub fn deliver(registry: &ConnectionRegistry, dispatch: Dispatch) -> usize {
    let event_type = dispatch.event.event_type();
    let delivered = match &dispatch.target {
        DeliveryTarget::User(user_id) => {
            usize::from(registry.send_to_user(*user_id, &dispatch.event))
        }
        DeliveryTarget::Users(user_ids) => registry.send_to_users(user_ids, &dispatch.event),
        DeliveryTarget::All => registry.broadcast(&dispatch.event),
    };

    tracing::debug!(event_type = event_type, delivered = delivered, "Push event delivered");
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::registry::{PushFrame, RegistrySettings};
    use domain::models::event::OnlineUsersPayload;
    use domain::models::PushEvent;
    use std::time::Duration;
    use uuid::Uuid;

    fn registry() -> ConnectionRegistry {
        ConnectionRegistry::new(RegistrySettings {
            heartbeat_interval: Duration::from_secs(60),
            write_timeout: Duration::from_millis(50),
        })
    }

    fn online(ids: Vec<Uuid>) -> PushEvent {
        PushEvent::OnlineUsers(OnlineUsersPayload::new(ids))
    }

    async fn next_event(rx: &mut mpsc::Receiver<PushFrame>) -> PushEvent {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("timed out waiting for frame")
                .expect("stream closed");
            if let PushFrame::Event(frame) = frame {
                return frame.into_event().unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_publish_delivers_in_order() {
        let registry = registry();
        let user = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(16);
        registry.register(user, tx).await.unwrap();
        assert!(matches!(next_event(&mut rx).await, PushEvent::Connected(_)));

        let (notifier, _handle) = RegistryNotifier::spawn(registry.clone(), 16);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        assert_eq!(
            notifier.publish(Dispatch::to_user(user, online(vec![first]))),
            PublishResult::Queued
        );
        assert_eq!(
            notifier.publish(Dispatch::to_all(online(vec![second]))),
            PublishResult::Queued
        );

        assert_eq!(next_event(&mut rx).await, online(vec![first]));
        assert_eq!(next_event(&mut rx).await, online(vec![second]));
        assert_eq!(notifier.online_count(), 1);
    }

    #[tokio::test]
    async fn test_stalled_peer_does_not_hold_up_delivery() {
        let registry = ConnectionRegistry::new(RegistrySettings {
            heartbeat_interval: Duration::from_secs(60),
            write_timeout: Duration::from_secs(5),
        });
        let stalled = Uuid::new_v4();
        let (stalled_tx, _stalled_rx) = mpsc::channel(1);
        registry.register(stalled, stalled_tx).await.unwrap();
        let healthy = Uuid::new_v4();
        let (healthy_tx, mut healthy_rx) = mpsc::channel(16);
        registry.register(healthy, healthy_tx).await.unwrap();
        assert!(matches!(next_event(&mut healthy_rx).await, PushEvent::Connected(_)));

        let (notifier, _handle) = RegistryNotifier::spawn(registry.clone(), 16);
        notifier.publish(Dispatch::to_user(stalled, online(vec![stalled])));
        notifier.publish(Dispatch::to_user(healthy, online(vec![healthy])));

        let frame = tokio::time::timeout(Duration::from_millis(500), healthy_rx.recv())
            .await
            .expect("healthy peer waited behind the stalled one")
            .unwrap();
        match frame {
            PushFrame::Event(frame) => {
                assert_eq!(frame.into_event().unwrap(), online(vec![healthy]))
            }
            other => panic!("Expected event frame, got {:?}", other),
        }
        assert!(!registry.is_connected(stalled));
    }

    #[tokio::test]
    async fn test_full_queue_drops() {
        let registry = registry();
        let (queue, _receiver) = mpsc::channel(1);
        let notifier = RegistryNotifier { queue, registry };

        assert_eq!(
            notifier.publish(Dispatch::to_all(online(vec![]))),
            PublishResult::Queued
        );
        assert!(matches!(
            notifier.publish(Dispatch::to_all(online(vec![]))),
            PublishResult::Dropped(_)
        ));
    }

    #[tokio::test]
    async fn test_stopped_loop_drops() {
        let registry = registry();
        let (queue, receiver) = mpsc::channel(4);
        drop(receiver);
        let notifier = RegistryNotifier { queue, registry };

        assert_eq!(
            notifier.publish(Dispatch::to_all(online(vec![]))),
            PublishResult::Dropped("delivery loop stopped".to_string())
        );
    }

    #[tokio::test]
    async fn test_deliver_to_users_counts_connected_only() {
        let registry = registry();
        let connected = Uuid::new_v4();
        let (tx, _rx) = mpsc::channel(16);
        registry.register(connected, tx).await.unwrap();

        let dispatch = Dispatch::to_users(vec![connected, Uuid::new_v4()], online(vec![]));
        assert_eq!(deliver(&registry, dispatch), 1);
        assert_eq!(
            deliver(&registry, Dispatch::to_user(Uuid::new_v4(), online(vec![]))),
            0
        );
    }
}
