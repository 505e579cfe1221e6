//! HTTP route handlers.

pub mod alert_rules;
pub mod alerts;
pub mod health;
pub mod messages;
pub mod stream;
