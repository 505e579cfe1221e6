//! Performance alert repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::performance_alert::{AlertFilter, NewPerformanceAlert, PerformanceAlert};
use domain::ports::AlertStore;
use domain::StoreResult;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::store_error;
use crate::entities::PerformanceAlertEntity;
use crate::metrics::QueryTimer;

/// Filter clause shared by the page and count queries.
const FILTER_CLAUSE: &str = r#"
    WHERE ($1::uuid IS NULL OR player_id = $1)
      AND ($2::text IS NULL OR alert_type = $2)
      AND ($3::text IS NULL OR severity = $3)
      AND ($4::boolean IS NULL OR acknowledged = $4)
      AND ($5::timestamptz IS NULL OR created_at >= $5)
      AND ($6::timestamptz IS NULL OR created_at <= $6)
"#;

/// Canonical dashboard ordering.
const CANONICAL_ORDER: &str = r#"
    ORDER BY acknowledged ASC,
        CASE severity
            WHEN 'critical' THEN 4
            WHEN 'alert' THEN 3
            WHEN 'warning' THEN 2
            ELSE 1
        END DESC,
        created_at DESC,
        id DESC
"#;

/// Repository for performance alert database operations.
#[derive(Clone)]
pub struct PerformanceAlertRepository {
    pool: PgPool,
}

impl PerformanceAlertRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlertStore for PerformanceAlertRepository {
    async fn create(&self, alert: NewPerformanceAlert) -> StoreResult<PerformanceAlert> {
        let timer = QueryTimer::new("create_performance_alert");
        let result = sqlx::query_as::<_, PerformanceAlertEntity>(
            r#"
            INSERT INTO performance_alerts (
                rule_id,
                player_id,
                alert_type,
                severity,
                metric,
                current_value,
                threshold_value,
                message,
                action_required
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(alert.rule_id)
        .bind(alert.player_id)
        .bind(&alert.alert_type)
        .bind(alert.severity.as_str())
        .bind(&alert.metric)
        .bind(alert.current_value)
        .bind(alert.threshold_value)
        .bind(&alert.message)
        .bind(alert.action_required)
        .fetch_one(&self.pool)
        .await;
        timer.record();

        result.map_err(store_error)?.try_into()
    }

    async fn find(&self, id: Uuid) -> StoreResult<Option<PerformanceAlert>> {
        let timer = QueryTimer::new("find_performance_alert");
        let result = sqlx::query_as::<_, PerformanceAlertEntity>(
            r#"
            SELECT * FROM performance_alerts
            WHERE alert_id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        result
            .map_err(store_error)?
            .map(PerformanceAlert::try_from)
            .transpose()
    }

    async fn list(&self, filter: &AlertFilter) -> StoreResult<(Vec<PerformanceAlert>, i64)> {
        let severity = filter.severity.map(|s| s.as_str());

        let timer = QueryTimer::new("count_filtered_alerts");
        let count_sql = format!("SELECT COUNT(*) FROM performance_alerts {}", FILTER_CLAUSE);
        let total: Result<(i64,), _> = sqlx::query_as(&count_sql)
            .bind(filter.player_id)
            .bind(filter.alert_type.as_deref())
            .bind(severity)
            .bind(filter.acknowledged)
            .bind(filter.since)
            .bind(filter.until)
            .fetch_one(&self.pool)
            .await;
        timer.record();
        let (total,) = total.map_err(store_error)?;

        let timer = QueryTimer::new("list_filtered_alerts");
        let page_sql = format!(
            "SELECT * FROM performance_alerts {} {} LIMIT $7 OFFSET $8",
            FILTER_CLAUSE, CANONICAL_ORDER
        );
        let result = sqlx::query_as::<_, PerformanceAlertEntity>(&page_sql)
            .bind(filter.player_id)
            .bind(filter.alert_type.as_deref())
            .bind(severity)
            .bind(filter.acknowledged)
            .bind(filter.since)
            .bind(filter.until)
            .bind(filter.page.limit)
            .bind(filter.page.offset)
            .fetch_all(&self.pool)
            .await;
        timer.record();

        let alerts = result
            .map_err(store_error)?
            .into_iter()
            .map(PerformanceAlert::try_from)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok((alerts, total))
    }

    async fn list_unacknowledged(&self) -> StoreResult<Vec<PerformanceAlert>> {
        let timer = QueryTimer::new("list_unacknowledged_alerts");
        let sql = format!(
            "SELECT * FROM performance_alerts WHERE acknowledged = FALSE {}",
            CANONICAL_ORDER
        );
        let result = sqlx::query_as::<_, PerformanceAlertEntity>(&sql)
            .fetch_all(&self.pool)
            .await;
        timer.record();

        result
            .map_err(store_error)?
            .into_iter()
            .map(PerformanceAlert::try_from)
            .collect()
    }

    async fn count(&self) -> StoreResult<i64> {
        let timer = QueryTimer::new("count_alerts");
        let result: Result<(i64,), _> =
            sqlx::query_as("SELECT COUNT(*) FROM performance_alerts")
                .fetch_one(&self.pool)
                .await;
        timer.record();

        Ok(result.map_err(store_error)?.0)
    }

    async fn acknowledge(
        &self,
        id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<PerformanceAlert>> {
        let timer = QueryTimer::new("acknowledge_alert");
        let result = sqlx::query_as::<_, PerformanceAlertEntity>(
            r#"
            UPDATE performance_alerts
            SET acknowledged = TRUE,
                acknowledged_by = $2,
                acknowledged_at = $3
            WHERE alert_id = $1 AND acknowledged = FALSE
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        match result.map_err(store_error)? {
            Some(entity) => Ok(Some(entity.try_into()?)),
            // Either missing or already acknowledged.
            None => self.find(id).await,
        }
    }
}
