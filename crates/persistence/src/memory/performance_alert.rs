//! In-memory implementation of the `AlertStore` port.

use std::cmp::Ordering;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::performance_alert::{
    canonical_order, AlertFilter, NewPerformanceAlert, PerformanceAlert,
};
use domain::ports::AlertStore;
use domain::StoreResult;
use uuid::Uuid;

use super::poisoned;

/// Thread-safe alert store. Alerts are kept in creation order, which breaks
/// ties in the canonical ordering.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAlertStore {
    alerts: Arc<RwLock<Vec<PerformanceAlert>>>,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a fully formed alert, e.g. an already acknowledged one.
    pub fn insert(&self, alert: PerformanceAlert) -> StoreResult<()> {
        self.alerts.write().map_err(poisoned)?.push(alert);
        Ok(())
    }
}

/// Canonical order with later insertions first among equals.
fn sorted(mut alerts: Vec<(usize, PerformanceAlert)>) -> Vec<PerformanceAlert> {
    alerts.sort_by(|(ia, a), (ib, b)| match canonical_order(a, b) {
        Ordering::Equal => ib.cmp(ia),
        other => other,
    });
    alerts.into_iter().map(|(_, a)| a).collect()
}

#[async_trait]
impl AlertStore for InMemoryAlertStore {
    async fn create(&self, alert: NewPerformanceAlert) -> StoreResult<PerformanceAlert> {
        let created = PerformanceAlert {
            id: Uuid::new_v4(),
            rule_id: alert.rule_id,
            player_id: alert.player_id,
            alert_type: alert.alert_type,
            severity: alert.severity,
            metric: alert.metric,
            current_value: alert.current_value,
            threshold_value: alert.threshold_value,
            message: alert.message,
            action_required: alert.action_required,
            acknowledged: false,
            acknowledged_by: None,
            acknowledged_at: None,
            created_at: Utc::now(),
        };
        self.alerts.write().map_err(poisoned)?.push(created.clone());
        Ok(created)
    }

    async fn find(&self, id: Uuid) -> StoreResult<Option<PerformanceAlert>> {
        let alerts = self.alerts.read().map_err(poisoned)?;
        Ok(alerts.iter().find(|a| a.id == id).cloned())
    }

    async fn list(&self, filter: &AlertFilter) -> StoreResult<(Vec<PerformanceAlert>, i64)> {
        let alerts = self.alerts.read().map_err(poisoned)?;
        let matching: Vec<(usize, PerformanceAlert)> = alerts
            .iter()
            .enumerate()
            .filter(|(_, a)| filter.matches(a))
            .map(|(i, a)| (i, a.clone()))
            .collect();
        let total = matching.len() as i64;

        let page = sorted(matching)
            .into_iter()
            .skip(filter.page.offset.max(0) as usize)
            .take(filter.page.limit.max(0) as usize)
            .collect();

        Ok((page, total))
    }

    async fn list_unacknowledged(&self) -> StoreResult<Vec<PerformanceAlert>> {
        let alerts = self.alerts.read().map_err(poisoned)?;
        Ok(sorted(
            alerts
                .iter()
                .enumerate()
                .filter(|(_, a)| !a.acknowledged)
                .map(|(i, a)| (i, a.clone()))
                .collect(),
        ))
    }

    async fn count(&self) -> StoreResult<i64> {
        Ok(self.alerts.read().map_err(poisoned)?.len() as i64)
    }

    async fn acknowledge(
        &self,
        id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<PerformanceAlert>> {
        let mut alerts = self.alerts.write().map_err(poisoned)?;
        Ok(alerts.iter_mut().find(|a| a.id == id).map(|alert| {
            if !alert.acknowledged {
                alert.acknowledged = true;
                alert.acknowledged_by = Some(user_id);
                alert.acknowledged_at = Some(at);
            }
            alert.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use domain::models::AlertSeverity;
    use shared::pagination::PageRequest;

    fn new_alert(player_id: Uuid, severity: AlertSeverity) -> NewPerformanceAlert {
        NewPerformanceAlert {
            rule_id: None,
            player_id,
            alert_type: "performance".to_string(),
            severity,
            metric: "benchmark_hit_rate".to_string(),
            current_value: 42.0,
            threshold_value: 50.0,
            message: "Below benchmark".to_string(),
            action_required: severity == AlertSeverity::Critical,
        }
    }

    #[tokio::test]
    async fn test_acknowledge_is_one_way() {
        let store = InMemoryAlertStore::new();
        let alert = store
            .create(new_alert(Uuid::new_v4(), AlertSeverity::Warning))
            .await
            .unwrap();
        let coach = Uuid::new_v4();
        let first_at = Utc::now();

        let first = store.acknowledge(alert.id, coach, first_at).await.unwrap().unwrap();
        let second = store
            .acknowledge(alert.id, Uuid::new_v4(), first_at + Duration::minutes(1))
            .await
            .unwrap()
            .unwrap();

        assert!(second.acknowledged);
        assert_eq!(second.acknowledged_by, Some(coach));
        assert_eq!(second.acknowledged_at, first.acknowledged_at);
        assert!(store
            .acknowledge(Uuid::new_v4(), coach, first_at)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_list_orders_canonically_and_paginates() {
        let store = InMemoryAlertStore::new();
        let player = Uuid::new_v4();
        let warning = store.create(new_alert(player, AlertSeverity::Warning)).await.unwrap();
        let critical = store.create(new_alert(player, AlertSeverity::Critical)).await.unwrap();
        let info = store.create(new_alert(player, AlertSeverity::Info)).await.unwrap();
        store.acknowledge(critical.id, Uuid::new_v4(), Utc::now()).await.unwrap();

        let filter = AlertFilter::default();
        let (alerts, total) = store.list(&filter).await.unwrap();
        assert_eq!(total, 3);
        let ids: Vec<Uuid> = alerts.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![warning.id, info.id, critical.id]);

        let second_page = AlertFilter {
            page: PageRequest::normalize(Some(1), Some(1), 50, 200),
            ..Default::default()
        };
        let (page, total) = store.list(&second_page).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, info.id);
    }

    #[tokio::test]
    async fn test_list_unacknowledged_and_count() {
        let store = InMemoryAlertStore::new();
        let a = store
            .create(new_alert(Uuid::new_v4(), AlertSeverity::Alert))
            .await
            .unwrap();
        store
            .create(new_alert(Uuid::new_v4(), AlertSeverity::Alert))
            .await
            .unwrap();
        store.acknowledge(a.id, Uuid::new_v4(), Utc::now()).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(store.list_unacknowledged().await.unwrap().len(), 1);
    }
}
