//! Persistence layer for the Sideline backend.
//!
//! This crate contains:
//! - Database connection management and migrations
//! - Entity definitions (database row mappings)
//! - PostgreSQL repositories implementing the domain ports
//! - In-memory implementations of the same ports
//! - Query metrics

pub mod db;
pub mod entities;
pub mod memory;
pub mod metrics;
pub mod repositories;
pub mod stores;

pub use stores::Stores;
