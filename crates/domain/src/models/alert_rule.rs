//! Alert rule domain model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use shared::validation::validate_not_blank;

use super::performance_alert::AlertSeverity;

/// Default look-back window for metric evaluation.
pub const DEFAULT_TIME_WINDOW_DAYS: i32 = 7;

/// Default alert type for rules that do not name one.
pub const DEFAULT_ALERT_TYPE: &str = "performance";

/// A threshold comparison with its bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlertCondition {
    Below(f64),
    Above(f64),
    /// Exact float equality, no tolerance.
    Equals(f64),
    /// Inclusive range.
    Between { low: f64, high: f64 },
}

impl AlertCondition {
    /// Builds a condition from its wire form.
    pub fn from_parts(
        comparison: &str,
        threshold: f64,
        secondary: Option<f64>,
    ) -> Result<Self, String> {
        match comparison {
            "below" => Ok(AlertCondition::Below(threshold)),
            "above" => Ok(AlertCondition::Above(threshold)),
            "equals" => Ok(AlertCondition::Equals(threshold)),
            "between" => match secondary {
                Some(high) if high > threshold => Ok(AlertCondition::Between {
                    low: threshold,
                    high,
                }),
                Some(_) => Err(
                    "secondaryThreshold must be greater than thresholdValue".to_string(),
                ),
                None => Err("secondaryThreshold is required for between".to_string()),
            },
            _ => Err(format!("Unknown comparison: {}", comparison)),
        }
    }

    pub fn comparison(&self) -> &'static str {
        match self {
            AlertCondition::Below(_) => "below",
            AlertCondition::Above(_) => "above",
            AlertCondition::Equals(_) => "equals",
            AlertCondition::Between { .. } => "between",
        }
    }

    /// The primary threshold reported on alerts.
    pub fn threshold(&self) -> f64 {
        match *self {
            AlertCondition::Below(t) | AlertCondition::Above(t) | AlertCondition::Equals(t) => t,
            AlertCondition::Between { low, .. } => low,
        }
    }

    pub fn secondary_threshold(&self) -> Option<f64> {
        match *self {
            AlertCondition::Between { high, .. } => Some(high),
            _ => None,
        }
    }

    pub fn is_triggered(&self, value: f64) -> bool {
        match *self {
            AlertCondition::Below(t) => value < t,
            AlertCondition::Above(t) => value > t,
            #[allow(clippy::float_cmp)]
            AlertCondition::Equals(t) => value == t,
            AlertCondition::Between { low, high } => low <= value && value <= high,
        }
    }
}

/// How often a rule is evaluated by the scheduled checker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckFrequency {
    Hourly,
    #[default]
    Daily,
    Weekly,
}

impl CheckFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckFrequency::Hourly => "hourly",
            CheckFrequency::Daily => "daily",
            CheckFrequency::Weekly => "weekly",
        }
    }

    pub fn period(&self) -> Duration {
        match self {
            CheckFrequency::Hourly => Duration::hours(1),
            CheckFrequency::Daily => Duration::days(1),
            CheckFrequency::Weekly => Duration::weeks(1),
        }
    }
}

impl fmt::Display for CheckFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hourly" => Ok(CheckFrequency::Hourly),
            "daily" => Ok(CheckFrequency::Daily),
            "weekly" => Ok(CheckFrequency::Weekly),
            _ => Err(format!("Unknown check frequency: {}", s)),
        }
    }
}

/// Which players a rule targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppliesTo {
    All,
    Players(Vec<Uuid>),
}

impl AppliesTo {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppliesTo::All => "all",
            AppliesTo::Players(_) => "specific",
        }
    }

    pub fn player_ids(&self) -> &[Uuid] {
        match self {
            AppliesTo::All => &[],
            AppliesTo::Players(ids) => ids,
        }
    }

    /// Builds the target set from its stored column pair.
    pub fn from_parts(applies_to: &str, player_ids: Vec<Uuid>) -> Result<Self, String> {
        match applies_to {
            "all" => Ok(AppliesTo::All),
            "specific" | "specific-list" | "specific_list" => {
                if player_ids.is_empty() {
                    Err("specificPlayerIds must not be empty".to_string())
                } else {
                    Ok(AppliesTo::Players(player_ids))
                }
            }
            _ => Err(format!("Unknown appliesTo value: {}", applies_to)),
        }
    }
}

/// A named threshold rule.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRule {
    pub id: Uuid,
    pub name: String,
    pub metric_name: String,
    pub condition: AlertCondition,
    pub time_window_days: i32,
    pub alert_type: String,
    pub severity: AlertSeverity,
    pub message_template: String,
    pub check_frequency: CheckFrequency,
    pub applies_to: AppliesTo,
    pub is_active: bool,
    pub last_evaluated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AlertRule {
    /// Whether the scheduled checker should evaluate this rule at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        match self.last_evaluated_at {
            None => true,
            Some(last) => now - last >= self.check_frequency.period(),
        }
    }

    /// Renders the alert text for one player.
    pub fn render_message(&self, player_name: &str, value: f64) -> String {
        render_template(
            &self.message_template,
            player_name,
            value,
            &self.metric_name,
            self.condition.threshold(),
        )
    }
}

/// Substitutes `{player_name}`, `{value}`, `{metric}` and `{threshold}`.
///
/// Numbers are formatted with two decimals. Unknown tokens are left as-is.
pub fn render_template(
    template: &str,
    player_name: &str,
    value: f64,
    metric: &str,
    threshold: f64,
) -> String {
    template
        .replace("{player_name}", player_name)
        .replace("{value}", &format!("{:.2}", value))
        .replace("{metric}", metric)
        .replace("{threshold}", &format!("{:.2}", threshold))
}

/// A validated rule ready to be upserted by name.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlertRule {
    pub name: String,
    pub metric_name: String,
    pub condition: AlertCondition,
    pub time_window_days: i32,
    pub alert_type: String,
    pub severity: AlertSeverity,
    pub message_template: String,
    pub check_frequency: CheckFrequency,
    pub applies_to: AppliesTo,
    pub is_active: bool,
}

fn default_time_window() -> i32 {
    DEFAULT_TIME_WINDOW_DAYS
}

fn default_alert_type() -> String {
    DEFAULT_ALERT_TYPE.to_string()
}

fn default_severity() -> AlertSeverity {
    AlertSeverity::Warning
}

fn default_applies_to() -> String {
    "all".to_string()
}

fn default_true() -> bool {
    true
}

/// Request payload for creating or replacing a rule by name.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpsertAlertRuleRequest {
    #[validate(
        length(min = 1, max = 100, message = "name must be 1-100 characters"),
        custom(function = "validate_not_blank")
    )]
    pub name: String,

    #[validate(custom(function = "validate_not_blank"))]
    pub metric_name: String,

    pub comparison: String,

    pub threshold_value: f64,

    pub secondary_threshold: Option<f64>,

    #[serde(default = "default_time_window")]
    #[validate(custom(function = "shared::validation::validate_time_window_days"))]
    pub time_window_days: i32,

    #[serde(default = "default_alert_type")]
    pub alert_type: String,

    #[serde(default = "default_severity")]
    pub severity: AlertSeverity,

    #[validate(custom(function = "validate_not_blank"))]
    pub message_template: String,

    #[serde(default)]
    pub check_frequency: CheckFrequency,

    #[serde(default = "default_applies_to")]
    pub applies_to: String,

    #[serde(default)]
    pub specific_player_ids: Vec<Uuid>,

    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl UpsertAlertRuleRequest {
    /// A rule applying to every player with default settings.
    pub fn new(
        name: impl Into<String>,
        metric_name: impl Into<String>,
        comparison: impl Into<String>,
        threshold_value: f64,
        message_template: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            metric_name: metric_name.into(),
            comparison: comparison.into(),
            threshold_value,
            secondary_threshold: None,
            time_window_days: DEFAULT_TIME_WINDOW_DAYS,
            alert_type: default_alert_type(),
            severity: default_severity(),
            message_template: message_template.into(),
            check_frequency: CheckFrequency::Daily,
            applies_to: default_applies_to(),
            specific_player_ids: Vec::new(),
            is_active: true,
        }
    }

    /// Converts the wire form into a typed rule.
    ///
    /// Field-level checks are done by `validate()`; this covers the
    /// cross-field constraints.
    pub fn into_new_rule(self) -> Result<NewAlertRule, String> {
        let condition =
            AlertCondition::from_parts(&self.comparison, self.threshold_value, self.secondary_threshold)?;
        let applies_to = AppliesTo::from_parts(&self.applies_to, self.specific_player_ids)?;
        let alert_type = if self.alert_type.trim().is_empty() {
            default_alert_type()
        } else {
            self.alert_type
        };

        Ok(NewAlertRule {
            name: self.name.trim().to_string(),
            metric_name: self.metric_name,
            condition,
            time_window_days: self.time_window_days,
            alert_type,
            severity: self.severity,
            message_template: self.message_template,
            check_frequency: self.check_frequency,
            applies_to,
            is_active: self.is_active,
        })
    }
}

/// Wire form of a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRuleResponse {
    pub id: Uuid,
    pub name: String,
    pub metric_name: String,
    pub comparison: String,
    pub threshold_value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_threshold: Option<f64>,
    pub time_window_days: i32,
    pub alert_type: String,
    pub severity: AlertSeverity,
    pub message_template: String,
    pub check_frequency: CheckFrequency,
    pub applies_to: String,
    pub specific_player_ids: Vec<Uuid>,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_evaluated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AlertRule> for AlertRuleResponse {
    fn from(rule: AlertRule) -> Self {
        Self {
            id: rule.id,
            comparison: rule.condition.comparison().to_string(),
            threshold_value: rule.condition.threshold(),
            secondary_threshold: rule.condition.secondary_threshold(),
            applies_to: rule.applies_to.as_str().to_string(),
            specific_player_ids: rule.applies_to.player_ids().to_vec(),
            name: rule.name,
            metric_name: rule.metric_name,
            time_window_days: rule.time_window_days,
            alert_type: rule.alert_type,
            severity: rule.severity,
            message_template: rule.message_template,
            check_frequency: rule.check_frequency,
            is_active: rule.is_active,
            last_evaluated_at: rule.last_evaluated_at,
            created_at: rule.created_at,
            updated_at: rule.updated_at,
        }
    }
}

/// Result of an upsert.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertAlertRuleResponse {
    pub rule: AlertRuleResponse,
    pub created: bool,
}
