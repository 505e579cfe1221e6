//! Performance alert domain model and dashboard aggregation.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::pagination::{PageInfo, PageRequest};
use uuid::Uuid;

/// Default page size for alert listings.
pub const DEFAULT_ALERT_PAGE_SIZE: i64 = 50;

/// Maximum page size for alert listings.
pub const MAX_ALERT_PAGE_SIZE: i64 = 200;

/// Unacknowledged alerts a player needs before counting as at risk.
pub const AT_RISK_THRESHOLD: usize = 2;

/// Alert severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Alert,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Alert => "alert",
            AlertSeverity::Critical => "critical",
        }
    }

    /// Numeric rank used for ordering in SQL.
    pub fn rank(&self) -> i16 {
        match self {
            AlertSeverity::Info => 1,
            AlertSeverity::Warning => 2,
            AlertSeverity::Alert => 3,
            AlertSeverity::Critical => 4,
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(AlertSeverity::Info),
            "warning" => Ok(AlertSeverity::Warning),
            "alert" => Ok(AlertSeverity::Alert),
            "critical" => Ok(AlertSeverity::Critical),
            _ => Err(format!("Unknown alert severity: {}", s)),
        }
    }
}

/// An alert raised for a player when a rule fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceAlert {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<Uuid>,
    pub player_id: Uuid,
    pub alert_type: String,
    pub severity: AlertSeverity,
    pub metric: String,
    pub current_value: f64,
    pub threshold_value: f64,
    pub message: String,
    pub action_required: bool,
    pub acknowledged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// An alert ready to be persisted. The store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPerformanceAlert {
    pub rule_id: Option<Uuid>,
    pub player_id: Uuid,
    pub alert_type: String,
    pub severity: AlertSeverity,
    pub metric: String,
    pub current_value: f64,
    pub threshold_value: f64,
    pub message: String,
    pub action_required: bool,
}

/// Canonical dashboard ordering: unacknowledged first, then most severe,
/// then newest.
pub fn canonical_order(a: &PerformanceAlert, b: &PerformanceAlert) -> Ordering {
    a.acknowledged
        .cmp(&b.acknowledged)
        .then_with(|| b.severity.cmp(&a.severity))
        .then_with(|| b.created_at.cmp(&a.created_at))
}

/// Sorts alerts in canonical dashboard order.
pub fn sort_canonical(alerts: &mut [PerformanceAlert]) {
    alerts.sort_by(canonical_order);
}

/// Filters for alert listings.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertFilter {
    pub player_id: Option<Uuid>,
    pub alert_type: Option<String>,
    pub severity: Option<AlertSeverity>,
    pub acknowledged: Option<bool>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub page: PageRequest,
}

impl Default for AlertFilter {
    fn default() -> Self {
        Self {
            player_id: None,
            alert_type: None,
            severity: None,
            acknowledged: None,
            since: None,
            until: None,
            page: PageRequest::normalize(None, None, DEFAULT_ALERT_PAGE_SIZE, MAX_ALERT_PAGE_SIZE),
        }
    }
}

impl AlertFilter {
    /// Whether `alert` passes every filter. Pagination is not applied.
    pub fn matches(&self, alert: &PerformanceAlert) -> bool {
        self.player_id.map_or(true, |id| alert.player_id == id)
            && self
                .alert_type
                .as_deref()
                .map_or(true, |t| alert.alert_type == t)
            && self.severity.map_or(true, |s| alert.severity == s)
            && self.acknowledged.map_or(true, |a| alert.acknowledged == a)
            && self.since.map_or(true, |since| alert.created_at >= since)
            && self.until.map_or(true, |until| alert.created_at <= until)
    }
}

/// Query parameters for listing alerts.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAlertsQuery {
    pub player_id: Option<Uuid>,
    pub alert_type: Option<String>,
    pub severity: Option<AlertSeverity>,
    pub acknowledged: Option<bool>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl From<ListAlertsQuery> for AlertFilter {
    fn from(q: ListAlertsQuery) -> Self {
        Self {
            player_id: q.player_id,
            alert_type: q.alert_type,
            severity: q.severity,
            acknowledged: q.acknowledged,
            since: q.since,
            until: q.until,
            page: PageRequest::normalize(
                q.limit,
                q.offset,
                DEFAULT_ALERT_PAGE_SIZE,
                MAX_ALERT_PAGE_SIZE,
            ),
        }
    }
}

/// Response for listing alerts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAlertsResponse {
    pub alerts: Vec<PerformanceAlert>,
    pub alerts_by_player: BTreeMap<Uuid, Vec<PerformanceAlert>>,
    pub pagination: PageInfo,
}

impl ListAlertsResponse {
    pub fn new(alerts: Vec<PerformanceAlert>, pagination: PageInfo) -> Self {
        let mut alerts_by_player: BTreeMap<Uuid, Vec<PerformanceAlert>> = BTreeMap::new();
        for alert in &alerts {
            alerts_by_player
                .entry(alert.player_id)
                .or_default()
                .push(alert.clone());
        }
        Self {
            alerts,
            alerts_by_player,
            pagination,
        }
    }
}

/// A player with several open alerts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AtRiskPlayer {
    pub player_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_name: Option<String>,
    pub alert_count: usize,
    pub max_severity: AlertSeverity,
}

/// Dashboard summary of alert state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSummary {
    pub total: i64,
    pub unacknowledged: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub recent_critical: Vec<PerformanceAlert>,
    pub at_risk_players: Vec<AtRiskPlayer>,
}

/// Builds the dashboard summary from the unacknowledged alert set.
///
/// `player_names` resolves ids to display names; unknown players are still
/// reported without a name.
pub fn summarize(
    total: i64,
    unacknowledged: &[PerformanceAlert],
    player_names: &HashMap<Uuid, String>,
    recent_critical_limit: usize,
) -> AlertSummary {
    let mut by_severity: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
    let mut per_player: HashMap<Uuid, (usize, AlertSeverity)> = HashMap::new();

    for alert in unacknowledged {
        *by_severity
            .entry(alert.severity.as_str().to_string())
            .or_insert(0) += 1;
        *by_type.entry(alert.alert_type.clone()).or_insert(0) += 1;

        let entry = per_player
            .entry(alert.player_id)
            .or_insert((0, alert.severity));
        entry.0 += 1;
        entry.1 = entry.1.max(alert.severity);
    }

    let mut recent_critical: Vec<PerformanceAlert> = unacknowledged
        .iter()
        .filter(|a| a.severity == AlertSeverity::Critical)
        .cloned()
        .collect();
    recent_critical.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    recent_critical.truncate(recent_critical_limit);

    let mut at_risk_players: Vec<AtRiskPlayer> = per_player
        .into_iter()
        .filter(|(_, (count, _))| *count >= AT_RISK_THRESHOLD)
        .map(|(player_id, (alert_count, max_severity))| AtRiskPlayer {
            player_id,
            player_name: player_names.get(&player_id).cloned(),
            alert_count,
            max_severity,
        })
        .collect();
    at_risk_players.sort_by(|a, b| {
        b.alert_count
            .cmp(&a.alert_count)
            .then_with(|| b.max_severity.cmp(&a.max_severity))
            .then_with(|| a.player_id.cmp(&b.player_id))
    });

    AlertSummary {
        total,
        unacknowledged: unacknowledged.len(),
        by_severity,
        by_type,
        recent_critical,
        at_risk_players,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn alert(player_id: Uuid, severity: AlertSeverity, minutes_ago: i64) -> PerformanceAlert {
        PerformanceAlert {
            id: Uuid::new_v4(),
            rule_id: None,
            player_id,
            alert_type: "performance_decline".to_string(),
            severity,
            metric: "benchmark_hit_rate".to_string(),
            current_value: 42.0,
            threshold_value: 50.0,
            message: "Hit rate dropped".to_string(),
            action_required: severity == AlertSeverity::Critical,
            acknowledged: false,
            acknowledged_by: None,
            acknowledged_at: None,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn test_canonical_order() {
        let player = Uuid::new_v4();
        let mut acked_critical = alert(player, AlertSeverity::Critical, 0);
        acked_critical.acknowledged = true;
        let old_critical = alert(player, AlertSeverity::Critical, 30);
        let new_critical = alert(player, AlertSeverity::Critical, 1);
        let warning = alert(player, AlertSeverity::Warning, 0);

        let mut alerts = vec![
            warning.clone(),
            acked_critical.clone(),
            old_critical.clone(),
            new_critical.clone(),
        ];
        sort_canonical(&mut alerts);

        let ids: Vec<Uuid> = alerts.iter().map(|a| a.id).collect();
        assert_eq!(
            ids,
            vec![new_critical.id, old_critical.id, warning.id, acked_critical.id]
        );
    }

    #[test]
    fn test_severity_parsing_and_rank() {
        assert_eq!("alert".parse::<AlertSeverity>().unwrap(), AlertSeverity::Alert);
        assert!("severe".parse::<AlertSeverity>().is_err());
        assert!(AlertSeverity::Critical.rank() > AlertSeverity::Alert.rank());
        assert!(AlertSeverity::Critical > AlertSeverity::Info);
    }

    #[test]
    fn test_summarize_at_risk_players() {
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let alerts = vec![
            alert(p1, AlertSeverity::Warning, 3),
            alert(p1, AlertSeverity::Critical, 2),
            alert(p1, AlertSeverity::Info, 1),
            alert(p2, AlertSeverity::Alert, 1),
        ];
        let mut names = HashMap::new();
        names.insert(p1, "Jordan Reyes".to_string());

        let summary = summarize(10, &alerts, &names, 10);

        assert_eq!(summary.total, 10);
        assert_eq!(summary.unacknowledged, 4);
        assert_eq!(summary.at_risk_players.len(), 1);
        let at_risk = &summary.at_risk_players[0];
        assert_eq!(at_risk.player_id, p1);
        assert_eq!(at_risk.alert_count, 3);
        assert_eq!(at_risk.max_severity, AlertSeverity::Critical);
        assert_eq!(at_risk.player_name.as_deref(), Some("Jordan Reyes"));
    }

    #[test]
    fn test_summarize_groups_by_severity_and_type() {
        let player = Uuid::new_v4();
        let mut attendance = alert(player, AlertSeverity::Warning, 1);
        attendance.alert_type = "attendance".to_string();
        let alerts = vec![
            alert(player, AlertSeverity::Warning, 2),
            attendance,
            alert(player, AlertSeverity::Critical, 3),
        ];

        let summary = summarize(3, &alerts, &HashMap::new(), 10);

        assert_eq!(summary.by_severity.get("warning"), Some(&2));
        assert_eq!(summary.by_severity.get("critical"), Some(&1));
        assert_eq!(summary.by_type.get("performance_decline"), Some(&2));
        assert_eq!(summary.by_type.get("attendance"), Some(&1));
        assert_eq!(summary.recent_critical.len(), 1);
    }

    #[test]
    fn test_summarize_limits_recent_critical_newest_first() {
        let player = Uuid::new_v4();
        let alerts: Vec<PerformanceAlert> = (0..5)
            .map(|i| alert(player, AlertSeverity::Critical, i * 10))
            .collect();

        let summary = summarize(5, &alerts, &HashMap::new(), 3);

        assert_eq!(summary.recent_critical.len(), 3);
        assert_eq!(summary.recent_critical[0].id, alerts[0].id);
        assert_eq!(summary.recent_critical[2].id, alerts[2].id);
    }

    #[test]
    fn test_alert_filter_matches() {
        let player = Uuid::new_v4();
        let a = alert(player, AlertSeverity::Warning, 60);

        assert!(AlertFilter::default().matches(&a));
        assert!(AlertFilter {
            player_id: Some(player),
            acknowledged: Some(false),
            ..Default::default()
        }
        .matches(&a));
        assert!(!AlertFilter {
            severity: Some(AlertSeverity::Critical),
            ..Default::default()
        }
        .matches(&a));
        assert!(!AlertFilter {
            since: Some(Utc::now() - Duration::minutes(5)),
            ..Default::default()
        }
        .matches(&a));
    }

    #[test]
    fn test_list_alerts_query_pagination_defaults() {
        let query: ListAlertsQuery = serde_json::from_str(r#"{"limit": 1000}"#).unwrap();
        let filter: AlertFilter = query.into();
        assert_eq!(filter.page.limit, MAX_ALERT_PAGE_SIZE);
        assert_eq!(filter.page.offset, 0);
    }

    #[test]
    fn test_list_alerts_response_groups_by_player() {
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let alerts = vec![
            alert(p1, AlertSeverity::Warning, 1),
            alert(p2, AlertSeverity::Warning, 2),
            alert(p1, AlertSeverity::Info, 3),
        ];
        let page = PageRequest::normalize(None, None, 50, 200);
        let response = ListAlertsResponse::new(alerts, page.info(3));

        assert_eq!(response.alerts_by_player.get(&p1).map(Vec::len), Some(2));
        assert_eq!(response.alerts_by_player.get(&p2).map(Vec::len), Some(1));
        assert!(!response.pagination.has_more);
    }
}
