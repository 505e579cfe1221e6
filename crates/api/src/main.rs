use std::time::Duration;

use anyhow::Result;
use persistence::Stores;
use tracing::info;

use sideline_api::app::{create_router, AppState};
use sideline_api::config::{Config, StorageBackend};
use sideline_api::jobs::{AlertCheckJob, JobScheduler, PoolMetricsJob};
use sideline_api::middleware::{init_metrics, logging::init_logging};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    init_logging(&config.logging);
    init_metrics()?;

    info!("Starting Sideline API v{}", env!("CARGO_PKG_VERSION"));

    let (stores, pool) = match config.storage.backend {
        StorageBackend::Postgres => {
            let pool = persistence::db::create_pool(&(&config.database).into()).await?;

            info!("Running database migrations...");
            persistence::db::run_migrations(&pool).await?;
            info!("Migrations completed");

            (Stores::postgres(pool.clone()), Some(pool))
        }
        StorageBackend::Memory => {
            info!("Using in-memory storage; data is lost on restart");
            (Stores::in_memory(), None)
        }
    };

    let addr = config.socket_addr()?;
    let check_interval = config.alerts.check_interval_minutes;
    let state = AppState::new(config, stores, pool.clone());

    let mut scheduler = JobScheduler::new();
    if check_interval > 0 {
        scheduler.register(AlertCheckJob::new(state.engine.clone(), check_interval));
    }
    if let Some(pool) = pool {
        scheduler.register(PoolMetricsJob::new(pool));
    }
    scheduler.start();

    let app = create_router(state);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown();
    if !scheduler.wait_for_shutdown(Duration::from_secs(30)).await {
        tracing::warn!("Exiting with background jobs still running");
    }
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
