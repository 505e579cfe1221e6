//! Alert evaluation engine.
//!
//! One pass scans every selected rule against every targeted player,
//! persists an alert for each rule that fires, and pushes it to the player.
//! Passes do not deduplicate: running twice over unchanged metrics creates
//! the same alerts twice.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use shared::validation::{truncate_chars, DIRECT_CONTENT_MAX_CHARS};

use crate::error::DomainResult;
use crate::models::alert_rule::{AlertRule, AppliesTo};
use crate::models::event::PushEvent;
use crate::models::message::{
    MessagePriority, Metadata, SendDirectMessageRequest, ALERT_MESSAGE_SOURCE,
    METADATA_ALERT_ID_KEY, METADATA_SOURCE_KEY,
};
use crate::models::performance_alert::{AlertSeverity, NewPerformanceAlert, PerformanceAlert};
use crate::models::player::Player;
use crate::ports::{AlertRuleStore, AlertStore, MetricsProvider, RosterProvider};
use crate::services::messaging::MessagingService;
use crate::services::notification::{Dispatch, Notifier, PublishResult};

/// Engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertEngineConfig {
    /// Sender of the direct messages that accompany severe alerts.
    pub system_sender_id: Uuid,
    /// Lowest severity that also produces a direct message.
    pub direct_message_min_severity: AlertSeverity,
}

impl Default for AlertEngineConfig {
    fn default() -> Self {
        Self {
            system_sender_id: Uuid::nil(),
            direct_message_min_severity: AlertSeverity::Critical,
        }
    }
}

/// Outcome of one evaluation pass.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationReport {
    pub alerts_generated: usize,
    pub alerts: Vec<PerformanceAlert>,
}

#[derive(Clone)]
pub struct AlertEngine {
    rules: Arc<dyn AlertRuleStore>,
    alerts: Arc<dyn AlertStore>,
    roster: Arc<dyn RosterProvider>,
    metrics: Arc<dyn MetricsProvider>,
    notifier: Arc<dyn Notifier>,
    messaging: MessagingService,
    config: AlertEngineConfig,
    pass_lock: Arc<Mutex<()>>,
}

impl AlertEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rules: Arc<dyn AlertRuleStore>,
        alerts: Arc<dyn AlertStore>,
        roster: Arc<dyn RosterProvider>,
        metrics: Arc<dyn MetricsProvider>,
        notifier: Arc<dyn Notifier>,
        messaging: MessagingService,
        config: AlertEngineConfig,
    ) -> Self {
        Self {
            rules,
            alerts,
            roster,
            metrics,
            notifier,
            messaging,
            config,
            pass_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Evaluates every active rule.
    pub async fn run_checks(&self) -> DomainResult<EvaluationReport> {
        let _pass = self.pass_lock.lock().await;
        let rules = self.rules.list_active().await?;
        self.evaluate(&rules, Utc::now(), false).await
    }

    /// Evaluates the active rules whose check frequency has elapsed and
    /// stamps each one as evaluated at `now` as soon as it is done.
    ///
    /// A rule that raised alerts before failing is still stamped, so a
    /// retried pass does not raise them again.
    pub async fn run_due_checks(&self, now: DateTime<Utc>) -> DomainResult<EvaluationReport> {
        let _pass = self.pass_lock.lock().await;
        let rules: Vec<AlertRule> = self
            .rules
            .list_active()
            .await?
            .into_iter()
            .filter(|r| r.is_due(now))
            .collect();

        self.evaluate(&rules, now, true).await
    }

    async fn evaluate(
        &self,
        rules: &[AlertRule],
        now: DateTime<Utc>,
        stamp: bool,
    ) -> DomainResult<EvaluationReport> {
        if rules.is_empty() {
            tracing::debug!("No alert rules to evaluate");
            return Ok(EvaluationReport::default());
        }

        let roster = self.roster.list_players().await?;
        let names: HashMap<Uuid, &str> = roster.iter().map(|p| (p.id, p.name.as_str())).collect();

        let mut generated = Vec::new();
        for rule in rules {
            let before = generated.len();
            let outcome = self
                .evaluate_rule(rule, &roster, &names, now, &mut generated)
                .await;

            if stamp && (outcome.is_ok() || generated.len() > before) {
                self.rules.mark_evaluated(rule.id, now).await?;
            }
            if let Err(e) = outcome {
                tracing::error!(
                    rule = %rule.name,
                    alerts_generated = generated.len() - before,
                    error = %e,
                    "Alert rule evaluation failed"
                );
                return Err(e);
            }
        }

        tracing::info!(
            rules = rules.len(),
            alerts_generated = generated.len(),
            "Alert evaluation pass complete"
        );

        Ok(EvaluationReport {
            alerts_generated: generated.len(),
            alerts: generated,
        })
    }

    /// Evaluates one rule against its targets, appending raised alerts to
    /// `generated` as they are stored.
    async fn evaluate_rule(
        &self,
        rule: &AlertRule,
        roster: &[Player],
        names: &HashMap<Uuid, &str>,
        now: DateTime<Utc>,
        generated: &mut Vec<PerformanceAlert>,
    ) -> DomainResult<()> {
        let targets: Vec<Player> = match &rule.applies_to {
            AppliesTo::All => roster.to_vec(),
            AppliesTo::Players(ids) => ids
                .iter()
                .filter_map(|id| match names.get(id) {
                    Some(name) => Some(Player::new(*id, *name)),
                    None => {
                        tracing::warn!(
                            rule = %rule.name,
                            player_id = %id,
                            "Rule targets a player missing from the roster"
                        );
                        None
                    }
                })
                .collect(),
        };

        for player in &targets {
            if let Some(alert) = self.evaluate_player(rule, player, now).await? {
                generated.push(alert);
            }
        }
        Ok(())
    }

    async fn evaluate_player(
        &self,
        rule: &AlertRule,
        player: &Player,
        now: DateTime<Utc>,
    ) -> DomainResult<Option<PerformanceAlert>> {
        let value = match self
            .metrics
            .current_value(player.id, &rule.metric_name, rule.time_window_days, now)
            .await
        {
            Ok(Some(value)) => value,
            Ok(None) => return Ok(None),
            Err(e) => {
                tracing::warn!(
                    rule = %rule.name,
                    player_id = %player.id,
                    metric = %rule.metric_name,
                    error = %e,
                    "Failed to read player metric, skipping"
                );
                return Ok(None);
            }
        };

        if !rule.condition.is_triggered(value) {
            return Ok(None);
        }

        let alert = self
            .alerts
            .create(NewPerformanceAlert {
                rule_id: Some(rule.id),
                player_id: player.id,
                alert_type: rule.alert_type.clone(),
                severity: rule.severity,
                metric: rule.metric_name.clone(),
                current_value: value,
                threshold_value: rule.condition.threshold(),
                message: rule.render_message(&player.name, value),
                action_required: rule.severity == AlertSeverity::Critical,
            })
            .await?;

        tracing::info!(
            alert_id = %alert.id,
            rule = %rule.name,
            player_id = %player.id,
            severity = %alert.severity,
            value = value,
            "Performance alert raised"
        );

        if let PublishResult::Dropped(reason) = self
            .notifier
            .publish(Dispatch::to_user(player.id, PushEvent::NewAlert(alert.clone())))
        {
            tracing::warn!(alert_id = %alert.id, reason = %reason, "Alert push dropped");
        }

        if alert.severity >= self.config.direct_message_min_severity {
            self.send_alert_message(&alert).await;
        }

        Ok(Some(alert))
    }

    async fn send_alert_message(&self, alert: &PerformanceAlert) {
        let mut metadata = Metadata::new();
        metadata.insert(METADATA_SOURCE_KEY.to_string(), ALERT_MESSAGE_SOURCE.into());
        metadata.insert(METADATA_ALERT_ID_KEY.to_string(), alert.id.to_string().into());

        let request = SendDirectMessageRequest {
            recipient_id: Some(alert.player_id),
            content: truncate_chars(&alert.message, DIRECT_CONTENT_MAX_CHARS),
            priority: alert_message_priority(alert.severity),
            metadata,
            expires_at: None,
        };

        if let Err(e) = self
            .messaging
            .send_direct(self.config.system_sender_id, request)
            .await
        {
            tracing::warn!(
                alert_id = %alert.id,
                player_id = %alert.player_id,
                error = %e,
                "Failed to send alert message"
            );
        }
    }
}

fn alert_message_priority(severity: AlertSeverity) -> MessagePriority {
    if severity == AlertSeverity::Critical {
        MessagePriority::Urgent
    } else {
        MessagePriority::High
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_message_priority() {
        assert_eq!(
            alert_message_priority(AlertSeverity::Critical),
            MessagePriority::Urgent
        );
        assert_eq!(
            alert_message_priority(AlertSeverity::Alert),
            MessagePriority::High
        );
    }

    #[test]
    fn test_default_config() {
        let config = AlertEngineConfig::default();
        assert_eq!(config.system_sender_id, Uuid::nil());
        assert_eq!(config.direct_message_min_severity, AlertSeverity::Critical);
    }
}
