//! In-memory implementation of the `AlertRuleStore` port.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::alert_rule::{AlertRule, NewAlertRule};
use domain::ports::AlertRuleStore;
use domain::StoreResult;
use uuid::Uuid;

use super::poisoned;

/// Thread-safe rule store. Rules keep their creation order.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAlertRuleStore {
    rules: Arc<RwLock<Vec<AlertRule>>>,
}

impl InMemoryAlertRuleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertRuleStore for InMemoryAlertRuleStore {
    async fn upsert(&self, rule: NewAlertRule) -> StoreResult<(AlertRule, bool)> {
        let mut rules = self.rules.write().map_err(poisoned)?;
        let now = Utc::now();

        if let Some(existing) = rules.iter_mut().find(|r| r.name == rule.name) {
            existing.metric_name = rule.metric_name;
            existing.condition = rule.condition;
            existing.time_window_days = rule.time_window_days;
            existing.alert_type = rule.alert_type;
            existing.severity = rule.severity;
            existing.message_template = rule.message_template;
            existing.check_frequency = rule.check_frequency;
            existing.applies_to = rule.applies_to;
            existing.is_active = rule.is_active;
            existing.updated_at = now;
            return Ok((existing.clone(), false));
        }

        let created = AlertRule {
            id: Uuid::new_v4(),
            name: rule.name,
            metric_name: rule.metric_name,
            condition: rule.condition,
            time_window_days: rule.time_window_days,
            alert_type: rule.alert_type,
            severity: rule.severity,
            message_template: rule.message_template,
            check_frequency: rule.check_frequency,
            applies_to: rule.applies_to,
            is_active: rule.is_active,
            last_evaluated_at: None,
            created_at: now,
            updated_at: now,
        };
        rules.push(created.clone());
        Ok((created, true))
    }

    async fn list(&self) -> StoreResult<Vec<AlertRule>> {
        Ok(self.rules.read().map_err(poisoned)?.clone())
    }

    async fn list_active(&self) -> StoreResult<Vec<AlertRule>> {
        let rules = self.rules.read().map_err(poisoned)?;
        Ok(rules.iter().filter(|r| r.is_active).cloned().collect())
    }

    async fn mark_evaluated(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        let mut rules = self.rules.write().map_err(poisoned)?;
        if let Some(rule) = rules.iter_mut().find(|r| r.id == id) {
            rule.last_evaluated_at = Some(at);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::alert_rule::{AlertCondition, AppliesTo, CheckFrequency};
    use domain::models::AlertSeverity;

    fn new_rule(name: &str, threshold: f64) -> NewAlertRule {
        NewAlertRule {
            name: name.to_string(),
            metric_name: "benchmark_hit_rate".to_string(),
            condition: AlertCondition::Below(threshold),
            time_window_days: 7,
            alert_type: "performance".to_string(),
            severity: AlertSeverity::Warning,
            message_template: "{player_name} at {value}".to_string(),
            check_frequency: CheckFrequency::Daily,
            applies_to: AppliesTo::All,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_upsert_by_name_is_idempotent() {
        let store = InMemoryAlertRuleStore::new();

        let (first, created) = store.upsert(new_rule("Low hit rate", 50.0)).await.unwrap();
        assert!(created);

        let (second, created) = store.upsert(new_rule("Low hit rate", 45.0)).await.unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(second.condition, AlertCondition::Below(45.0));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_active_and_mark_evaluated() {
        let store = InMemoryAlertRuleStore::new();
        let mut inactive = new_rule("Paused", 10.0);
        inactive.is_active = false;
        store.upsert(inactive).await.unwrap();
        let (active, _) = store.upsert(new_rule("Live", 10.0)).await.unwrap();

        let listed = store.list_active().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, active.id);

        let at = Utc::now();
        store.mark_evaluated(active.id, at).await.unwrap();
        assert_eq!(
            store.list_active().await.unwrap()[0].last_evaluated_at,
            Some(at)
        );
    }
}
