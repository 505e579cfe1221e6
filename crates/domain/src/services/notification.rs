//! Notification port for real-time push delivery.
//!
//! Services publish typed events here once a write has succeeded. Delivery
//! happens elsewhere and its outcome never flows back to the publisher.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use uuid::Uuid;

use crate::models::event::PushEvent;

/// Who should receive a pushed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryTarget {
    User(Uuid),
    Users(Vec<Uuid>),
    All,
}

/// An event addressed to one or more connected sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub target: DeliveryTarget,
    pub event: PushEvent,
}

impl Dispatch {
    pub fn to_user(user_id: Uuid, event: PushEvent) -> Self {
        Self {
            target: DeliveryTarget::User(user_id),
            event,
        }
    }

    pub fn to_users(user_ids: Vec<Uuid>, event: PushEvent) -> Self {
        Self {
            target: DeliveryTarget::Users(user_ids),
            event,
        }
    }

    pub fn to_all(event: PushEvent) -> Self {
        Self {
            target: DeliveryTarget::All,
            event,
        }
    }

    /// Whether `user_id` is among the recipients.
    pub fn targets(&self, user_id: Uuid) -> bool {
        match &self.target {
            DeliveryTarget::User(id) => *id == user_id,
            DeliveryTarget::Users(ids) => ids.contains(&user_id),
            DeliveryTarget::All => true,
        }
    }
}

/// Result of handing a dispatch to the notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishResult {
    /// Accepted for delivery.
    Queued,
    /// Not accepted (queue full or delivery stopped).
    Dropped(String),
}

/// Push notification sink.
///
/// `publish` must not block; it hands the dispatch off and returns.
pub trait Notifier: Send + Sync {
    fn publish(&self, dispatch: Dispatch) -> PublishResult;

    /// Number of sessions currently connected. Informational only.
    fn online_count(&self) -> usize;
}

/// Notifier for development and testing.
///
/// Records every dispatch instead of delivering it.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    dispatches: Mutex<Vec<Dispatch>>,
    online: AtomicUsize,
    /// Whether to simulate a full delivery queue.
    pub simulate_drop: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier reporting `online` connected sessions.
    pub fn with_online(online: usize) -> Self {
        Self {
            online: AtomicUsize::new(online),
            ..Self::default()
        }
    }

    /// A notifier that drops everything.
    pub fn dropping() -> Self {
        Self {
            simulate_drop: true,
            ..Self::default()
        }
    }

    pub fn set_online(&self, online: usize) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Every dispatch recorded so far, in publish order.
    pub fn dispatches(&self) -> Vec<Dispatch> {
        self.dispatches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events that would reach `user_id`, in publish order.
    pub fn events_for(&self, user_id: Uuid) -> Vec<PushEvent> {
        self.dispatches()
            .into_iter()
            .filter(|d| d.targets(user_id))
            .map(|d| d.event)
            .collect()
    }

    pub fn clear(&self) {
        self.dispatches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Notifier for RecordingNotifier {
    fn publish(&self, dispatch: Dispatch) -> PublishResult {
        if self.simulate_drop {
            tracing::warn!(
                event_type = dispatch.event.event_type(),
                "Recording notifier simulating dropped dispatch"
            );
            return PublishResult::Dropped("Simulated drop".to_string());
        }

        tracing::debug!(
            event_type = dispatch.event.event_type(),
            target = ?dispatch.target,
            "Recording dispatch"
        );
        self.dispatches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(dispatch);
        PublishResult::Queued
    }

    fn online_count(&self) -> usize {
        self.online.load(Ordering::SeqCst)
    }
}
