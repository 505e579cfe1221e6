//! Periodic background jobs.
//!
//! Each job runs on its own task at a fixed period. A run that overruns its
//! period pushes the next one back instead of queueing catch-up runs, so a
//! slow alert pass is never followed by a burst of passes.

use std::sync::Arc;
use std::time::Duration;

use domain::DomainError;
use metrics::{counter, histogram};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Why a job run failed.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("{0}")]
    Failed(String),
}

/// A unit of periodic background work.
#[async_trait::async_trait]
pub trait Job: Send + Sync {
    /// Stable name used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Time between the starts of consecutive runs.
    fn period(&self) -> Duration;

    /// Whether the first run happens at start instead of one period later.
    fn run_at_start(&self) -> bool {
        false
    }

    async fn execute(&self) -> Result<(), JobError>;
}

/// Owns the job tasks and their shared shutdown signal.
pub struct JobScheduler {
    jobs: Vec<Arc<dyn Job>>,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl JobScheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            jobs: Vec::new(),
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    /// Adds a job. A job with a zero period is refused.
    pub fn register<J: Job + 'static>(&mut self, job: J) -> bool {
        if job.period().is_zero() {
            warn!(job = job.name(), "Refusing job with zero period");
            return false;
        }
        self.jobs.push(Arc::new(job));
        true
    }

    pub fn job_names(&self) -> Vec<&'static str> {
        self.jobs.iter().map(|j| j.name()).collect()
    }

    /// Spawns one task per registered job.
    pub fn start(&mut self) {
        info!(jobs = ?self.job_names(), "Starting job scheduler");
        for job in &self.jobs {
            let handle = tokio::spawn(run_job(Arc::clone(job), self.shutdown_tx.subscribe()));
            self.handles.push(handle);
        }
    }

    /// Signals every job to stop after its current run.
    pub fn shutdown(&self) {
        info!("Job scheduler shutting down");
        self.shutdown_tx.send_replace(true);
    }

    /// Waits for the job tasks to exit. Returns `false` if `timeout` passed
    /// first.
    pub async fn wait_for_shutdown(self, timeout: Duration) -> bool {
        let joined = async {
            for handle in self.handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Job task panicked");
                }
            }
        };

        match tokio::time::timeout(timeout, joined).await {
            Ok(()) => {
                info!("All jobs stopped");
                true
            }
            Err(_) => {
                warn!(timeout = ?timeout, "Jobs still running at shutdown deadline");
                false
            }
        }
    }
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_job(job: Arc<dyn Job>, mut shutdown: watch::Receiver<bool>) {
    let name = job.name();
    let period = job.period();
    let first = if job.run_at_start() {
        Instant::now()
    } else {
        Instant::now() + period
    };
    let mut ticker = tokio::time::interval_at(first, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(job = name, period = ?period, run_at_start = job.run_at_start(), "Job scheduled");

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                run_once(job.as_ref()).await;
            }
        }
    }
    info!(job = name, "Job stopped");
}

/// Runs a job once, recording its outcome. Returns whether it succeeded.
async fn run_once(job: &dyn Job) -> bool {
    let name = job.name();
    let started = std::time::Instant::now();
    let result = job.execute().await;
    let elapsed = started.elapsed();

    histogram!("sideline_job_duration_seconds", "job" => name).record(elapsed.as_secs_f64());
    match result {
        Ok(()) => {
            counter!("sideline_job_runs_total", "job" => name, "outcome" => "ok").increment(1);
            debug!(job = name, elapsed_ms = elapsed.as_millis() as u64, "Job run finished");
            true
        }
        Err(e) => {
            counter!("sideline_job_runs_total", "job" => name, "outcome" => "error").increment(1);
            error!(
                job = name,
                elapsed_ms = elapsed.as_millis() as u64,
                error = %e,
                "Job run failed"
            );
            false
        }
    }
}
