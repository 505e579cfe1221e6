//! Shared utilities and common types for the Sideline backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Message content and field validation
//! - Offset pagination helpers

pub mod pagination;
pub mod validation;
