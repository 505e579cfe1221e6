//! Storage and provider ports.
//!
//! The services in this crate depend on these traits only. The persistence
//! crate provides PostgreSQL and in-memory implementations.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::alert_rule::{AlertRule, NewAlertRule};
use crate::models::message::{Message, MessageFilter, MessageStatus, NewMessage};
use crate::models::performance_alert::{AlertFilter, NewPerformanceAlert, PerformanceAlert};
use crate::models::player::Player;

/// Durable record of broadcast and direct messages with read receipts.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create(&self, message: NewMessage) -> StoreResult<Message>;

    async fn find(&self, id: Uuid) -> StoreResult<Option<Message>>;

    /// Messages `user_id` may see, newest first, excluding those expired at
    /// `now`. `filter.limit` caps the result.
    async fn list_visible_to(
        &self,
        user_id: Uuid,
        filter: &MessageFilter,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Message>>;

    /// Records a receipt and returns whether it is new. An existing receipt
    /// keeps its original time. Concurrent calls for the same pair see
    /// exactly one `true`.
    async fn upsert_read_receipt(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        read_at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Moves the status forward. A backward move leaves it unchanged.
    async fn set_status(&self, id: Uuid, status: MessageStatus) -> StoreResult<Option<Message>>;

    /// Ids of every message `user_id` holds a receipt for.
    async fn read_message_ids(&self, user_id: Uuid) -> StoreResult<HashSet<Uuid>>;

    async fn delete(&self, id: Uuid) -> StoreResult<bool>;
}

/// Named threshold rules.
#[async_trait]
pub trait AlertRuleStore: Send + Sync {
    /// Inserts or replaces by name. Returns the rule and whether it is new.
    async fn upsert(&self, rule: NewAlertRule) -> StoreResult<(AlertRule, bool)>;

    async fn list(&self) -> StoreResult<Vec<AlertRule>>;

    async fn list_active(&self) -> StoreResult<Vec<AlertRule>>;

    async fn mark_evaluated(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;
}

/// Generated performance alerts.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn create(&self, alert: NewPerformanceAlert) -> StoreResult<PerformanceAlert>;

    async fn find(&self, id: Uuid) -> StoreResult<Option<PerformanceAlert>>;

    /// One page in canonical order, plus the total matching the filter.
    async fn list(&self, filter: &AlertFilter) -> StoreResult<(Vec<PerformanceAlert>, i64)>;

    async fn list_unacknowledged(&self) -> StoreResult<Vec<PerformanceAlert>>;

    async fn count(&self) -> StoreResult<i64>;

    /// Acknowledges an open alert. An already acknowledged alert is returned
    /// unchanged; `None` means the alert does not exist.
    async fn acknowledge(
        &self,
        id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<PerformanceAlert>>;
}

/// Player roster lookup.
#[async_trait]
pub trait RosterProvider: Send + Sync {
    async fn list_players(&self) -> StoreResult<Vec<Player>>;

    async fn find_player(&self, id: Uuid) -> StoreResult<Option<Player>>;
}

/// Player metric lookup.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    /// The player's current value for `metric` over the last `window_days`
    /// days before `now`, or `None` when nothing was recorded.
    async fn current_value(
        &self,
        player_id: Uuid,
        metric: &str,
        window_days: i32,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<f64>>;
}
