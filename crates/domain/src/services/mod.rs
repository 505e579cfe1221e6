//! Domain services for Sideline.
//!
//! Services contain business logic that operates on domain models through
//! the storage ports.

pub mod alert_engine;
pub mod alerts;
pub mod messaging;
pub mod notification;

pub use alert_engine::{AlertEngine, AlertEngineConfig, EvaluationReport};
pub use alerts::AlertService;
pub use messaging::MessagingService;
pub use notification::{DeliveryTarget, Dispatch, Notifier, PublishResult, RecordingNotifier};
