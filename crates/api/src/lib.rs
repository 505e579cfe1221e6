//! HTTP and push-stream surface of the Sideline coach dashboard backend.

pub mod app;
pub mod config;
pub mod error;
pub mod extractors;
pub mod jobs;
pub mod middleware;
pub mod realtime;
pub mod routes;
