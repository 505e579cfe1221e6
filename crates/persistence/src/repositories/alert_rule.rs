//! Alert rule repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::alert_rule::{AlertRule, NewAlertRule};
use domain::ports::AlertRuleStore;
use domain::StoreResult;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::store_error;
use crate::entities::{AlertRuleEntity, UpsertedAlertRuleEntity};
use crate::metrics::QueryTimer;

/// Repository for alert rule database operations.
#[derive(Clone)]
pub struct AlertRuleRepository {
    pool: PgPool,
}

impl AlertRuleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlertRuleStore for AlertRuleRepository {
    async fn upsert(&self, rule: NewAlertRule) -> StoreResult<(AlertRule, bool)> {
        let timer = QueryTimer::new("upsert_alert_rule");
        // xmax is zero only for freshly inserted tuples.
        let result = sqlx::query_as::<_, UpsertedAlertRuleEntity>(
            r#"
            INSERT INTO alert_rules (
                name,
                metric_name,
                comparison,
                threshold_value,
                secondary_threshold,
                time_window_days,
                alert_type,
                severity,
                message_template,
                check_frequency,
                applies_to,
                specific_player_ids,
                is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (name) DO UPDATE SET
                metric_name = EXCLUDED.metric_name,
                comparison = EXCLUDED.comparison,
                threshold_value = EXCLUDED.threshold_value,
                secondary_threshold = EXCLUDED.secondary_threshold,
                time_window_days = EXCLUDED.time_window_days,
                alert_type = EXCLUDED.alert_type,
                severity = EXCLUDED.severity,
                message_template = EXCLUDED.message_template,
                check_frequency = EXCLUDED.check_frequency,
                applies_to = EXCLUDED.applies_to,
                specific_player_ids = EXCLUDED.specific_player_ids,
                is_active = EXCLUDED.is_active,
                updated_at = NOW()
            RETURNING *, (xmax = 0) AS inserted
            "#,
        )
        .bind(&rule.name)
        .bind(&rule.metric_name)
        .bind(rule.condition.comparison())
        .bind(rule.condition.threshold())
        .bind(rule.condition.secondary_threshold())
        .bind(rule.time_window_days)
        .bind(&rule.alert_type)
        .bind(rule.severity.as_str())
        .bind(&rule.message_template)
        .bind(rule.check_frequency.as_str())
        .bind(rule.applies_to.as_str())
        .bind(rule.applies_to.player_ids().to_vec())
        .bind(rule.is_active)
        .fetch_one(&self.pool)
        .await;
        timer.record();

        let row = result.map_err(store_error)?;
        Ok((row.rule.try_into()?, row.inserted))
    }

    async fn list(&self) -> StoreResult<Vec<AlertRule>> {
        let timer = QueryTimer::new("list_alert_rules");
        let result = sqlx::query_as::<_, AlertRuleEntity>(
            r#"
            SELECT * FROM alert_rules
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await;
        timer.record();

        result
            .map_err(store_error)?
            .into_iter()
            .map(AlertRule::try_from)
            .collect()
    }

    async fn list_active(&self) -> StoreResult<Vec<AlertRule>> {
        let timer = QueryTimer::new("list_active_alert_rules");
        let result = sqlx::query_as::<_, AlertRuleEntity>(
            r#"
            SELECT * FROM alert_rules
            WHERE is_active = TRUE
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await;
        timer.record();

        result
            .map_err(store_error)?
            .into_iter()
            .map(AlertRule::try_from)
            .collect()
    }

    async fn mark_evaluated(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        let timer = QueryTimer::new("mark_alert_rule_evaluated");
        let result = sqlx::query(
            r#"
            UPDATE alert_rules
            SET last_evaluated_at = $2
            WHERE rule_id = $1
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await;
        timer.record();

        result.map_err(store_error)?;
        Ok(())
    }
}
