//! The set of port implementations a running service uses.

use std::sync::Arc;

use domain::ports::{AlertRuleStore, AlertStore, MessageStore, MetricsProvider, RosterProvider};
use sqlx::PgPool;

use crate::memory::{
    InMemoryAlertRuleStore, InMemoryAlertStore, InMemoryMessageStore, InMemoryPlayerMetrics,
    InMemoryRoster,
};
use crate::repositories::{
    AlertRuleRepository, MessageRepository, PerformanceAlertRepository, PlayerMetricsRepository,
    RosterRepository,
};

#[derive(Clone)]
pub struct Stores {
    pub messages: Arc<dyn MessageStore>,
    pub rules: Arc<dyn AlertRuleStore>,
    pub alerts: Arc<dyn AlertStore>,
    pub roster: Arc<dyn RosterProvider>,
    pub metrics: Arc<dyn MetricsProvider>,
}

impl Stores {
    /// PostgreSQL-backed stores sharing one pool.
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            messages: Arc::new(MessageRepository::new(pool.clone())),
            rules: Arc::new(AlertRuleRepository::new(pool.clone())),
            alerts: Arc::new(PerformanceAlertRepository::new(pool.clone())),
            roster: Arc::new(RosterRepository::new(pool.clone())),
            metrics: Arc::new(PlayerMetricsRepository::new(pool)),
        }
    }

    /// Fresh, empty in-memory stores.
    pub fn in_memory() -> Self {
        Self::from_memory(InMemoryRoster::new(), InMemoryPlayerMetrics::new())
    }

    /// In-memory stores over a pre-seeded roster and metrics.
    pub fn from_memory(roster: InMemoryRoster, metrics: InMemoryPlayerMetrics) -> Self {
        Self {
            messages: Arc::new(InMemoryMessageStore::new()),
            rules: Arc::new(InMemoryAlertRuleStore::new()),
            alerts: Arc::new(InMemoryAlertStore::new()),
            roster: Arc::new(roster),
            metrics: Arc::new(metrics),
        }
    }
}
