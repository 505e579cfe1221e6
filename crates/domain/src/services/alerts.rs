//! Alert queries, acknowledgement and rule management.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::error::{DomainError, DomainResult};
use crate::models::alert_rule::{AlertRuleResponse, UpsertAlertRuleRequest, UpsertAlertRuleResponse};
use crate::models::performance_alert::{
    summarize, AlertFilter, AlertSummary, ListAlertsResponse, PerformanceAlert,
};
use crate::ports::{AlertRuleStore, AlertStore, RosterProvider};

/// Default cap on critical alerts listed in the summary.
pub const DEFAULT_RECENT_CRITICAL_LIMIT: usize = 10;

#[derive(Clone)]
pub struct AlertService {
    rules: Arc<dyn AlertRuleStore>,
    alerts: Arc<dyn AlertStore>,
    roster: Arc<dyn RosterProvider>,
    recent_critical_limit: usize,
}

impl AlertService {
    pub fn new(
        rules: Arc<dyn AlertRuleStore>,
        alerts: Arc<dyn AlertStore>,
        roster: Arc<dyn RosterProvider>,
    ) -> Self {
        Self {
            rules,
            alerts,
            roster,
            recent_critical_limit: DEFAULT_RECENT_CRITICAL_LIMIT,
        }
    }

    pub fn with_recent_critical_limit(mut self, limit: usize) -> Self {
        self.recent_critical_limit = limit;
        self
    }

    /// One page of alerts in canonical order, grouped by player.
    pub async fn list_alerts(&self, filter: &AlertFilter) -> DomainResult<ListAlertsResponse> {
        let (alerts, total) = self.alerts.list(filter).await?;
        Ok(ListAlertsResponse::new(alerts, filter.page.info(total)))
    }

    pub async fn summary(&self) -> DomainResult<AlertSummary> {
        let total = self.alerts.count().await?;
        let open = self.alerts.list_unacknowledged().await?;
        let names: HashMap<Uuid, String> = self
            .roster
            .list_players()
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();

        Ok(summarize(total, &open, &names, self.recent_critical_limit))
    }

    /// Acknowledges an alert. Repeating the call returns the alert as first
    /// acknowledged.
    pub async fn acknowledge(&self, alert_id: Uuid, user_id: Uuid) -> DomainResult<PerformanceAlert> {
        let alert = self
            .alerts
            .acknowledge(alert_id, user_id, Utc::now())
            .await?
            .ok_or_else(|| DomainError::NotFound("Alert not found".to_string()))?;

        tracing::info!(
            alert_id = %alert_id,
            acknowledged_by = ?alert.acknowledged_by,
            "Alert acknowledged"
        );

        Ok(alert)
    }

    /// Creates a rule or replaces the one with the same name.
    pub async fn upsert_rule(
        &self,
        request: UpsertAlertRuleRequest,
    ) -> DomainResult<UpsertAlertRuleResponse> {
        request.validate()?;
        let new_rule = request.into_new_rule().map_err(DomainError::Validation)?;

        let (rule, created) = self.rules.upsert(new_rule).await?;

        tracing::info!(
            rule_id = %rule.id,
            name = %rule.name,
            created = created,
            "Alert rule saved"
        );

        Ok(UpsertAlertRuleResponse {
            rule: rule.into(),
            created,
        })
    }

    pub async fn list_rules(&self) -> DomainResult<Vec<AlertRuleResponse>> {
        Ok(self
            .rules
            .list()
            .await?
            .into_iter()
            .map(AlertRuleResponse::from)
            .collect())
    }
}
