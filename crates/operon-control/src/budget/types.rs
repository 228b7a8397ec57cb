use std::fmt;

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::scope::Scope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetType {
    Token,
    Cost,
    Calls,
}

impl fmt::Display for BudgetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BudgetType::Token => "token",
            BudgetType::Cost => "cost",
            BudgetType::Calls => "calls",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetPeriod {
    Hour,
    Day,
    Week,
    /// Calendar month; day-of-month clamps to the end of shorter months
    Month,
}

impl BudgetPeriod {
    /// The boundary one period after `from`
    pub fn advance(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        self.boundary(from, 1)
    }

    /// The `n`-th boundary counted from `anchor`.
    ///
    /// Months are counted from the anchor itself, so a clamped short month
    /// does not shift later boundaries.
    pub fn boundary(&self, anchor: DateTime<Utc>, n: u32) -> DateTime<Utc> {
        let n64 = i64::from(n);
        match self {
            BudgetPeriod::Hour => anchor + Duration::hours(n64),
            BudgetPeriod::Day => anchor + Duration::days(n64),
            BudgetPeriod::Week => anchor + Duration::weeks(n64),
            BudgetPeriod::Month => anchor
                .checked_add_months(Months::new(n))
                .unwrap_or(anchor + Duration::days(30 * n64)),
        }
    }
}

impl fmt::Display for BudgetPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BudgetPeriod::Hour => "hour",
            BudgetPeriod::Day => "day",
            BudgetPeriod::Week => "week",
            BudgetPeriod::Month => "month",
        })
    }
}

/// Parameters for `BudgetLedger::create`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetSpec {
    pub scope: Scope,
    #[serde(rename = "type")]
    pub budget_type: BudgetType,
    pub limit: f64,
    pub period: BudgetPeriod,
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: f64,
    #[serde(default = "default_enforce_limit")]
    pub enforce_limit: bool,
}

fn default_alert_threshold() -> f64 {
    0.8
}

fn default_enforce_limit() -> bool {
    true
}

impl BudgetSpec {
    pub fn new(scope: Scope, budget_type: BudgetType, limit: f64, period: BudgetPeriod) -> Self {
        Self {
            scope,
            budget_type,
            limit,
            period,
            alert_threshold: default_alert_threshold(),
            enforce_limit: default_enforce_limit(),
        }
    }

    pub fn alert_threshold(mut self, threshold: f64) -> Self {
        self.alert_threshold = threshold;
        self
    }

    pub fn enforce_limit(mut self, enforce: bool) -> Self {
        self.enforce_limit = enforce;
        self
    }
}

/// Partial update for `BudgetLedger::update`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetUpdate {
    pub limit: Option<f64>,
    pub period: Option<BudgetPeriod>,
    pub alert_threshold: Option<f64>,
    pub enforce_limit: Option<bool>,
}

/// Highest alert already emitted in the current period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum AlertState {
    #[default]
    Clear,
    Warned,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct Budget {
    pub id: String,
    pub scope: Scope,
    #[serde(rename = "type")]
    pub budget_type: BudgetType,
    pub limit: f64,
    pub period: BudgetPeriod,
    pub current: f64,
    pub reset_at: DateTime<Utc>,
    pub alert_threshold: f64,
    pub enforce_limit: bool,
    #[serde(skip)]
    pub(crate) alert_state: AlertState,
    /// Start of the period schedule; `reset_at` is `periods` periods after it
    #[serde(skip)]
    pub(crate) anchor: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) periods: u32,
}

impl Budget {
    pub fn remaining(&self) -> f64 {
        (self.limit - self.current).max(0.0)
    }

    pub fn status(&self) -> BudgetStatus {
        BudgetStatus {
            budget_id: self.id.clone(),
            scope: self.scope.clone(),
            budget_type: self.budget_type,
            current: self.current,
            limit: self.limit,
            remaining: self.remaining(),
            percent_used: self.current / self.limit * 100.0,
            reset_at: self.reset_at,
        }
    }
}

/// Answer to "may `amount` more be spent?"
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BudgetCheck {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// `None` when no budget is tracked for the scope and type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<f64>,
}

impl BudgetCheck {
    pub fn untracked() -> Self {
        Self {
            allowed: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetStatus {
    pub budget_id: String,
    pub scope: Scope,
    #[serde(rename = "type")]
    pub budget_type: BudgetType,
    pub current: f64,
    pub limit: f64,
    pub remaining: f64,
    pub percent_used: f64,
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Critical,
}

/// Emitted once per threshold crossing within a period
#[derive(Debug, Clone, Serialize)]
pub struct BudgetAlert {
    pub level: AlertLevel,
    pub budget_id: String,
    pub scope: Scope,
    #[serde(rename = "type")]
    pub budget_type: BudgetType,
    pub current: f64,
    pub limit: f64,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_month_follows_calendar() {
        let jan31 = Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap();
        let feb = BudgetPeriod::Month.advance(jan31);
        assert_eq!(feb, Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_month_boundaries_keep_anchor_day() {
        let anchor = Utc.with_ymd_and_hms(2023, 12, 31, 12, 0, 0).unwrap();
        let boundaries: Vec<_> = (1..=4)
            .map(|n| BudgetPeriod::Month.boundary(anchor, n))
            .collect();
        assert_eq!(
            boundaries,
            vec![
                Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 4, 30, 12, 0, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn test_fixed_periods() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(BudgetPeriod::Hour.advance(t) - t, Duration::seconds(3600));
        assert_eq!(BudgetPeriod::Day.advance(t) - t, Duration::seconds(86_400));
        assert_eq!(BudgetPeriod::Week.advance(t) - t, Duration::seconds(7 * 86_400));
    }

    #[test]
    fn test_spec_defaults_from_toml() {
        let spec: BudgetSpec = toml::from_str(
            r#"
            scope = "agent:writer"
            type = "token"
            limit = 1000
            period = "day"
            "#,
        )
        .unwrap();
        assert_eq!(spec.scope, Scope::agent("writer"));
        assert_eq!(spec.alert_threshold, 0.8);
        assert!(spec.enforce_limit);
    }
}
