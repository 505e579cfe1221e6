//! Roster and player metric repositories.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use domain::models::Player;
use domain::ports::{MetricsProvider, RosterProvider};
use domain::StoreResult;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::store_error;
use crate::entities::PlayerEntity;
use crate::metrics::QueryTimer;

/// Read-only access to the players table.
#[derive(Clone)]
pub struct RosterRepository {
    pool: PgPool,
}

impl RosterRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RosterProvider for RosterRepository {
    async fn list_players(&self) -> StoreResult<Vec<Player>> {
        let timer = QueryTimer::new("list_players");
        let result = sqlx::query_as::<_, PlayerEntity>(
            r#"
            SELECT * FROM players
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await;
        timer.record();

        Ok(result
            .map_err(store_error)?
            .into_iter()
            .map(Player::from)
            .collect())
    }

    async fn find_player(&self, id: Uuid) -> StoreResult<Option<Player>> {
        let timer = QueryTimer::new("find_player");
        let result = sqlx::query_as::<_, PlayerEntity>(
            r#"
            SELECT * FROM players
            WHERE player_id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        Ok(result.map_err(store_error)?.map(Player::from))
    }
}

/// Metric samples from the player_metrics table.
///
/// The current value of a metric is the mean of the samples recorded in
/// the look-back window.
#[derive(Clone)]
pub struct PlayerMetricsRepository {
    pool: PgPool,
}

impl PlayerMetricsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetricsProvider for PlayerMetricsRepository {
    async fn current_value(
        &self,
        player_id: Uuid,
        metric: &str,
        window_days: i32,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<f64>> {
        let since = now - Duration::days(i64::from(window_days));

        let timer = QueryTimer::new("player_metric_average");
        let result: Result<(Option<f64>,), _> = sqlx::query_as(
            r#"
            SELECT AVG(value) FROM player_metrics
            WHERE player_id = $1
              AND metric_name = $2
              AND recorded_at > $3
              AND recorded_at <= $4
            "#,
        )
        .bind(player_id)
        .bind(metric)
        .bind(since)
        .bind(now)
        .fetch_one(&self.pool)
        .await;
        timer.record();

        Ok(result.map_err(store_error)?.0)
    }
}
