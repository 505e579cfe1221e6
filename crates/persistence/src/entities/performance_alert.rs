//! Performance alert database entity.

use chrono::{DateTime, Utc};
use domain::models::performance_alert::PerformanceAlert;
use domain::StoreError;
use sqlx::FromRow;
use uuid::Uuid;

/// Database entity for the performance_alerts table.
#[derive(Debug, Clone, FromRow)]
pub struct PerformanceAlertEntity {
    pub id: i64,
    pub alert_id: Uuid,
    pub rule_id: Option<Uuid>,
    pub player_id: Uuid,
    pub alert_type: String,
    pub severity: String,
    pub metric: String,
    pub current_value: f64,
    pub threshold_value: f64,
    pub message: String,
    pub action_required: bool,
    pub acknowledged: bool,
    pub acknowledged_by: Option<Uuid>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<PerformanceAlertEntity> for PerformanceAlert {
    type Error = StoreError;

    fn try_from(entity: PerformanceAlertEntity) -> Result<Self, Self::Error> {
        Ok(Self {
            id: entity.alert_id,
            rule_id: entity.rule_id,
            player_id: entity.player_id,
            alert_type: entity.alert_type,
            severity: entity.severity.parse().map_err(StoreError::Corrupt)?,
            metric: entity.metric,
            current_value: entity.current_value,
            threshold_value: entity.threshold_value,
            message: entity.message,
            action_required: entity.action_required,
            acknowledged: entity.acknowledged,
            acknowledged_by: entity.acknowledged_by,
            acknowledged_at: entity.acknowledged_at,
            created_at: entity.created_at,
        })
    }
}
