//! Background job scheduler and job implementations.

mod alert_checks;
mod pool_metrics;
mod scheduler;

pub use alert_checks::AlertCheckJob;
pub use pool_metrics::PoolMetricsJob;
pub use scheduler::{Job, JobError, JobScheduler};
