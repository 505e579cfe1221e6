//! Real-time push: connection registry and delivery loop.

pub mod dispatcher;
pub mod registry;

pub use dispatcher::RegistryNotifier;
pub use registry::{ConnectionRegistry, DeliveryError, PushFrame, RegistrySettings};
