//! PostgreSQL implementations of the domain ports.

pub mod alert_rule;
pub mod message;
pub mod performance_alert;
pub mod roster;

pub use alert_rule::AlertRuleRepository;
pub use message::MessageRepository;
pub use performance_alert::PerformanceAlertRepository;
pub use roster::{PlayerMetricsRepository, RosterRepository};
