//! In-memory implementations of the domain ports.
//!
//! Used by the `memory` storage backend and by tests. Nothing survives a
//! restart.

use domain::StoreError;

pub mod alert_rule;
pub mod message;
pub mod performance_alert;
pub mod roster;

pub use alert_rule::InMemoryAlertRuleStore;
pub use message::InMemoryMessageStore;
pub use performance_alert::InMemoryAlertStore;
pub use roster::{InMemoryPlayerMetrics, InMemoryRoster};

fn poisoned<T>(err: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Backend(format!("lock poisoned: {}", err))
}
