//! Scheduled alert rule evaluation.

use std::time::Duration;

use chrono::Utc;
use domain::services::AlertEngine;

use super::scheduler::{Job, JobError};

/// Runs the rules whose own check frequency has elapsed.
///
/// The job wakes every `interval_minutes`; each rule then decides whether it
/// is due, so an hourly wake-up still evaluates a daily rule once a day. The
/// first wake-up is at start, picking up rules that came due while the
/// server was down.
pub struct AlertCheckJob {
    engine: AlertEngine,
    interval: Duration,
}

impl AlertCheckJob {
    pub fn new(engine: AlertEngine, interval_minutes: u64) -> Self {
        Self {
            engine,
            interval: Duration::from_secs(interval_minutes * 60),
        }
    }
}

#[async_trait::async_trait]
impl Job for AlertCheckJob {
    fn name(&self) -> &'static str {
        "alert_checks"
    }

    fn period(&self) -> Duration {
        self.interval
    }

    fn run_at_start(&self) -> bool {
        true
    }

    async fn execute(&self) -> Result<(), JobError> {
        let report = self.engine.run_due_checks(Utc::now()).await?;

        metrics::counter!("sideline_alerts_generated_total")
            .increment(report.alerts_generated as u64);
        tracing::info!(
            alerts_generated = report.alerts_generated,
            "Scheduled alert checks finished"
        );
        Ok(())
    }
}
