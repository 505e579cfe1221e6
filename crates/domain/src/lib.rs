//! Domain layer for the Sideline backend.
//!
//! This crate contains:
//! - Domain models (Message, AlertRule, PerformanceAlert, push events)
//! - Storage and provider ports implemented by the persistence layer
//! - Business logic services (messaging, alert evaluation, alert queries)
//! - Domain error types

pub mod error;
pub mod models;
pub mod ports;
pub mod services;

pub use error::{DomainError, DomainResult, StoreError, StoreResult};
