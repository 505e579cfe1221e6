//! Alert rule database entity.

use chrono::{DateTime, Utc};
use domain::models::alert_rule::{AlertCondition, AlertRule, AppliesTo};
use domain::StoreError;
use sqlx::FromRow;
use uuid::Uuid;

/// Database entity for the alert_rules table.
#[derive(Debug, Clone, FromRow)]
pub struct AlertRuleEntity {
    pub id: i64,
    pub rule_id: Uuid,
    pub name: String,
    pub metric_name: String,
    pub comparison: String,
    pub threshold_value: f64,
    pub secondary_threshold: Option<f64>,
    pub time_window_days: i32,
    pub alert_type: String,
    pub severity: String,
    pub message_template: String,
    pub check_frequency: String,
    pub applies_to: String,
    pub specific_player_ids: Vec<Uuid>,
    pub is_active: bool,
    pub last_evaluated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row returned by the upsert query.
#[derive(Debug, Clone, FromRow)]
pub struct UpsertedAlertRuleEntity {
    #[sqlx(flatten)]
    pub rule: AlertRuleEntity,
    pub inserted: bool,
}

impl TryFrom<AlertRuleEntity> for AlertRule {
    type Error = StoreError;

    fn try_from(entity: AlertRuleEntity) -> Result<Self, Self::Error> {
        let condition = AlertCondition::from_parts(
            &entity.comparison,
            entity.threshold_value,
            entity.secondary_threshold,
        )
        .map_err(StoreError::Corrupt)?;
        let applies_to = AppliesTo::from_parts(&entity.applies_to, entity.specific_player_ids)
            .map_err(StoreError::Corrupt)?;

        Ok(Self {
            id: entity.rule_id,
            name: entity.name,
            metric_name: entity.metric_name,
            condition,
            time_window_days: entity.time_window_days,
            alert_type: entity.alert_type,
            severity: entity.severity.parse().map_err(StoreError::Corrupt)?,
            message_template: entity.message_template,
            check_frequency: entity.check_frequency.parse().map_err(StoreError::Corrupt)?,
            applies_to,
            is_active: entity.is_active,
            last_evaluated_at: entity.last_evaluated_at,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        })
    }
}
