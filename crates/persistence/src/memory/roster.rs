//! In-memory roster and player metrics.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use domain::models::Player;
use domain::ports::{MetricsProvider, RosterProvider};
use domain::StoreResult;
use uuid::Uuid;

use super::poisoned;

/// Seedable roster.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRoster {
    players: Arc<RwLock<Vec<Player>>>,
}

impl InMemoryRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a player, replacing any with the same id.
    pub fn add_player(&self, player: Player) -> StoreResult<()> {
        let mut players = self.players.write().map_err(poisoned)?;
        players.retain(|p| p.id != player.id);
        players.push(player);
        Ok(())
    }
}

#[async_trait]
impl RosterProvider for InMemoryRoster {
    async fn list_players(&self) -> StoreResult<Vec<Player>> {
        let mut players = self.players.read().map_err(poisoned)?.clone();
        players.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(players)
    }

    async fn find_player(&self, id: Uuid) -> StoreResult<Option<Player>> {
        let players = self.players.read().map_err(poisoned)?;
        Ok(players.iter().find(|p| p.id == id).cloned())
    }
}

/// Seedable metric samples, averaged over the look-back window.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPlayerMetrics {
    samples: Arc<RwLock<HashMap<(Uuid, String), Vec<(DateTime<Utc>, f64)>>>>,
}

impl InMemoryPlayerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &self,
        player_id: Uuid,
        metric: &str,
        value: f64,
        recorded_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.samples
            .write()
            .map_err(poisoned)?
            .entry((player_id, metric.to_string()))
            .or_default()
            .push((recorded_at, value));
        Ok(())
    }

    /// Replaces every sample of `metric` for the player with one taken now.
    pub fn set_current(&self, player_id: Uuid, metric: &str, value: f64) -> StoreResult<()> {
        self.samples
            .write()
            .map_err(poisoned)?
            .insert((player_id, metric.to_string()), vec![(Utc::now(), value)]);
        Ok(())
    }
}

#[async_trait]
impl MetricsProvider for InMemoryPlayerMetrics {
    async fn current_value(
        &self,
        player_id: Uuid,
        metric: &str,
        window_days: i32,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<f64>> {
        let since = now - Duration::days(i64::from(window_days));
        let samples = self.samples.read().map_err(poisoned)?;

        let values: Vec<f64> = samples
            .get(&(player_id, metric.to_string()))
            .map(|s| {
                s.iter()
                    .filter(|(at, _)| *at > since && *at <= now)
                    .map(|(_, v)| *v)
                    .collect()
            })
            .unwrap_or_default();

        if values.is_empty() {
            return Ok(None);
        }
        Ok(Some(values.iter().sum::<f64>() / values.len() as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roster_lists_by_name() {
        let roster = InMemoryRoster::new();
        let a = Player::new(Uuid::new_v4(), "Avery Cole");
        let z = Player::new(Uuid::new_v4(), "Zion Park");
        roster.add_player(z.clone()).unwrap();
        roster.add_player(a.clone()).unwrap();

        assert_eq!(roster.list_players().await.unwrap(), vec![a.clone(), z]);
        assert_eq!(roster.find_player(a.id).await.unwrap(), Some(a));
        assert_eq!(roster.find_player(Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_metric_average_within_window() {
        let metrics = InMemoryPlayerMetrics::new();
        let player = Uuid::new_v4();
        let now = Utc::now();

        metrics
            .record(player, "sprint_time", 4.0, now - Duration::days(1))
            .unwrap();
        metrics
            .record(player, "sprint_time", 6.0, now - Duration::days(2))
            .unwrap();
        metrics
            .record(player, "sprint_time", 100.0, now - Duration::days(30))
            .unwrap();

        assert_eq!(
            metrics.current_value(player, "sprint_time", 7, now).await.unwrap(),
            Some(5.0)
        );
        assert_eq!(
            metrics.current_value(player, "vertical", 7, now).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_set_current_replaces_history() {
        let metrics = InMemoryPlayerMetrics::new();
        let player = Uuid::new_v4();
        metrics
            .record(player, "benchmark_hit_rate", 80.0, Utc::now())
            .unwrap();
        metrics.set_current(player, "benchmark_hit_rate", 42.0).unwrap();

        assert_eq!(
            metrics
                .current_value(player, "benchmark_hit_rate", 7, Utc::now())
                .await
                .unwrap(),
            Some(42.0)
        );
    }
}
