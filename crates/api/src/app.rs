use axum::{
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use persistence::Stores;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::middleware::{
    metrics_handler, metrics_middleware, security_headers_middleware, trace_id,
};
use crate::realtime::{ConnectionRegistry, RegistryNotifier, RegistrySettings};
use crate::routes::{alert_rules, alerts, health, messages, stream};
use domain::services::{AlertEngine, AlertService, MessagingService, Notifier};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Set when running on PostgreSQL; used by health checks.
    pub pool: Option<PgPool>,
    pub registry: ConnectionRegistry,
    pub notifier: Arc<dyn Notifier>,
    pub messaging: MessagingService,
    pub alerts: AlertService,
    pub engine: AlertEngine,
}

impl AppState {
    /// Wires services over `stores` and starts the push delivery loop.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(config: Config, stores: Stores, pool: Option<PgPool>) -> Self {
        let registry = ConnectionRegistry::new(RegistrySettings {
            heartbeat_interval: config.realtime.heartbeat_interval(),
            write_timeout: config.realtime.write_timeout(),
        });
        let (notifier, _delivery) =
            RegistryNotifier::spawn(registry.clone(), config.realtime.dispatch_queue_capacity);
        let notifier: Arc<dyn Notifier> = Arc::new(notifier);

        let messaging = MessagingService::new(stores.messages.clone(), notifier.clone());
        let alerts = AlertService::new(
            stores.rules.clone(),
            stores.alerts.clone(),
            stores.roster.clone(),
        )
        .with_recent_critical_limit(config.alerts.recent_critical_limit);
        let engine = AlertEngine::new(
            stores.rules,
            stores.alerts,
            stores.roster,
            stores.metrics,
            notifier.clone(),
            messaging.clone(),
            config.alerts.engine_config(),
        );

        Self {
            config: Arc::new(config),
            pool,
            registry,
            notifier,
            messaging,
            alerts,
            engine,
        }
    }
}

/// Builds state and router in one step.
pub fn create_app(config: Config, stores: Stores, pool: Option<PgPool>) -> Router {
    create_router(AppState::new(config, stores, pool))
}

pub fn create_router(state: AppState) -> Router {
    let config = state.config.clone();

    // Build CORS layer based on configuration
    let cors = if config.security.cors_origins.is_empty() {
        // Default: allow any origin (for development)
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        use tower_http::cors::AllowOrigin;
        let origins: Vec<_> = config
            .security
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Request/response routes; identity comes from X-User-Id
    let api_routes = Router::new()
        .route("/api/v1/messages", get(messages::list_messages))
        .route("/api/v1/messages/broadcast", post(messages::send_broadcast))
        .route("/api/v1/messages/direct", post(messages::send_direct))
        .route("/api/v1/messages/unread-count", get(messages::unread_count))
        .route("/api/v1/messages/:id", delete(messages::delete_message))
        .route("/api/v1/messages/:id/read", patch(messages::mark_read))
        .route("/api/v1/alerts", get(alerts::list_alerts))
        .route("/api/v1/alerts/summary", get(alerts::alert_summary))
        .route(
            "/api/v1/alerts/:id/acknowledge",
            patch(alerts::acknowledge_alert),
        )
        .route(
            "/api/v1/alert-rules",
            get(alert_rules::list_rules).post(alert_rules::upsert_rule),
        )
        .route("/api/v1/alert-rules/run-checks", post(alert_rules::run_checks))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )));

    // Long-lived push stream: no timeout, no compression
    let stream_routes = Router::new().route("/api/v1/messages/stream", get(stream::subscribe));

    // Public routes
    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .merge(stream_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}
