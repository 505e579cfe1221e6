//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod alert_rule;
pub mod message;
pub mod performance_alert;
pub mod player;

pub use alert_rule::{AlertRuleEntity, UpsertedAlertRuleEntity};
pub use message::{MessageEntity, ReadReceiptEntity};
pub use performance_alert::PerformanceAlertEntity;
pub use player::PlayerEntity;
