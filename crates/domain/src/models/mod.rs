//! Domain models for Sideline.

pub mod alert_rule;
pub mod event;
pub mod message;
pub mod performance_alert;
pub mod player;

pub use alert_rule::{AlertCondition, AlertRule, AppliesTo, CheckFrequency, NewAlertRule};
pub use event::{EventFrame, PushEvent};
pub use message::{Audience, Message, MessageKind, MessagePriority, MessageStatus, NewMessage};
pub use performance_alert::{AlertSeverity, NewPerformanceAlert, PerformanceAlert};
pub use player::Player;
