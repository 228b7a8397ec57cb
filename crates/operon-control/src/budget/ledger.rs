use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, warn};

use super::types::{
    AlertLevel, AlertState, Budget, BudgetAlert, BudgetCheck, BudgetSpec, BudgetStatus,
    BudgetType, BudgetUpdate,
};
use crate::clock::Clock;
use crate::error::{ControlError, Result};
use crate::scope::Scope;
use crate::telemetry::{TelemetryEvent, TelemetrySink};

type BudgetKey = (Scope, BudgetType);

/// Consumable quotas per scope, at most one per budget type.
///
/// Each budget is mutated under its map entry lock, so concurrent consumers
/// on the same scope never lose updates. Every accessor applies the lazy
/// period reset first.
pub struct BudgetLedger {
    budgets: DashMap<BudgetKey, Budget>,
    ids: DashMap<String, BudgetKey>,
    clock: Arc<dyn Clock>,
    telemetry: Option<TelemetrySink>,
}

impl BudgetLedger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            budgets: DashMap::new(),
            ids: DashMap::new(),
            clock,
            telemetry: None,
        }
    }

    /// Send threshold alerts to `sink`
    pub fn with_telemetry(mut self, sink: TelemetrySink) -> Self {
        self.telemetry = Some(sink);
        self
    }

    pub fn create(&self, spec: BudgetSpec) -> Result<Budget> {
        validate(spec.limit, spec.alert_threshold)?;

        let key = (spec.scope.clone(), spec.budget_type);
        let now = self.clock.now();
        let budget = match self.budgets.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(ControlError::validation(format!(
                    "{} budget already exists for {}",
                    spec.budget_type, spec.scope
                )));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let budget = Budget {
                    id: uuid::Uuid::new_v4().to_string(),
                    scope: spec.scope,
                    budget_type: spec.budget_type,
                    limit: spec.limit,
                    period: spec.period,
                    current: 0.0,
                    reset_at: spec.period.boundary(now, 1),
                    alert_threshold: spec.alert_threshold,
                    enforce_limit: spec.enforce_limit,
                    alert_state: AlertState::Clear,
                    anchor: now,
                    periods: 1,
                };
                slot.insert(budget.clone());
                budget
            }
        };

        self.ids.insert(budget.id.clone(), key);
        debug!(
            budget_id = %budget.id,
            scope = %budget.scope,
            budget_type = %budget.budget_type,
            limit = budget.limit,
            period = %budget.period,
            "Budget created"
        );
        Ok(budget)
    }

    /// Check whether `amount` more may be spent, without consuming it
    pub fn check(&self, scope: &Scope, budget_type: BudgetType, amount: f64) -> BudgetCheck {
        let Some(mut budget) = self.budgets.get_mut(&(scope.clone(), budget_type)) else {
            return BudgetCheck::untracked();
        };
        roll_over(&mut budget, self.clock.now());

        if budget.current + amount <= budget.limit {
            return BudgetCheck {
                allowed: true,
                remaining: Some(budget.limit - budget.current),
                ..BudgetCheck::default()
            };
        }

        let usage = format!(
            "{}/{} used this {} (requested {})",
            budget.current, budget.limit, budget.period, amount
        );
        if budget.enforce_limit {
            BudgetCheck {
                allowed: false,
                reason: Some(format!("{} budget exceeded: {}", budget_type, usage)),
                remaining: Some(budget.remaining()),
                ..BudgetCheck::default()
            }
        } else {
            BudgetCheck {
                allowed: true,
                warning: Some(format!(
                    "{} budget exceeded (not enforced): {}",
                    budget_type, usage
                )),
                remaining: Some(budget.remaining()),
                ..BudgetCheck::default()
            }
        }
    }

    /// Add `amount` to the budget's usage.
    ///
    /// Returns `None` when no budget is tracked for the scope and type.
    /// Negative or non-finite amounts are ignored.
    pub fn consume(
        &self,
        scope: &Scope,
        budget_type: BudgetType,
        amount: f64,
    ) -> Option<BudgetStatus> {
        let amount = if amount.is_finite() && amount >= 0.0 {
            amount
        } else {
            warn!(scope = %scope, budget_type = %budget_type, amount, "Ignoring invalid consumption amount");
            0.0
        };

        let now = self.clock.now();
        let (status, alert) = {
            let mut budget = self.budgets.get_mut(&(scope.clone(), budget_type))?;
            roll_over(&mut budget, now);
            let previous = budget.current;
            budget.current += amount;
            let alert = next_alert(&mut budget, previous).map(|level| BudgetAlert {
                level,
                budget_id: budget.id.clone(),
                scope: budget.scope.clone(),
                budget_type,
                current: budget.current,
                limit: budget.limit,
                at: now,
            });
            (budget.status(), alert)
        };

        if let Some(alert) = alert {
            warn!(
                level = ?alert.level,
                scope = %alert.scope,
                budget_type = %alert.budget_type,
                current = alert.current,
                limit = alert.limit,
                "Budget alert"
            );
            if let Some(sink) = &self.telemetry {
                sink.emit(TelemetryEvent::BudgetAlert(alert));
            }
        }

        Some(status)
    }

    pub fn status(&self, scope: &Scope, budget_type: BudgetType) -> Option<BudgetStatus> {
        let mut budget = self.budgets.get_mut(&(scope.clone(), budget_type))?;
        roll_over(&mut budget, self.clock.now());
        Some(budget.status())
    }

    pub fn get(&self, id: &str) -> Option<Budget> {
        let key = self.ids.get(id).map(|k| k.value().clone())?;
        let mut budget = self.budgets.get_mut(&key)?;
        roll_over(&mut budget, self.clock.now());
        Some(budget.clone())
    }

    /// Budgets, optionally filtered by scope, ordered by scope then type
    pub fn list(&self, scope: Option<&Scope>) -> Vec<Budget> {
        let now = self.clock.now();
        let mut budgets: Vec<Budget> = self
            .budgets
            .iter_mut()
            .filter(|entry| scope.map_or(true, |s| &entry.key().0 == s))
            .map(|mut entry| {
                roll_over(&mut entry, now);
                entry.clone()
            })
            .collect();
        budgets.sort_by(|a, b| (&a.scope, a.budget_type).cmp(&(&b.scope, b.budget_type)));
        budgets
    }

    /// Changing the period restarts it from now
    pub fn update(&self, id: &str, update: BudgetUpdate) -> Result<Budget> {
        let key = self
            .ids
            .get(id)
            .map(|k| k.value().clone())
            .ok_or_else(|| ControlError::not_found("budget", id))?;
        let mut budget = self
            .budgets
            .get_mut(&key)
            .ok_or_else(|| ControlError::not_found("budget", id))?;

        let now = self.clock.now();
        roll_over(&mut budget, now);

        let limit = update.limit.unwrap_or(budget.limit);
        let alert_threshold = update.alert_threshold.unwrap_or(budget.alert_threshold);
        validate(limit, alert_threshold)?;

        budget.limit = limit;
        budget.alert_threshold = alert_threshold;
        if let Some(enforce) = update.enforce_limit {
            budget.enforce_limit = enforce;
        }
        if let Some(period) = update.period {
            if period != budget.period {
                budget.period = period;
                budget.anchor = now;
                budget.periods = 1;
                budget.reset_at = period.boundary(now, 1);
            }
        }

        // Re-arm alerts the new limits put us back under
        if budget.current < budget.alert_threshold * budget.limit {
            budget.alert_state = AlertState::Clear;
        } else if budget.current < budget.limit && budget.alert_state == AlertState::Critical {
            budget.alert_state = AlertState::Warned;
        }

        debug!(budget_id = id, limit = budget.limit, "Budget updated");
        Ok(budget.clone())
    }

    pub fn delete(&self, id: &str) -> Result<Budget> {
        let (_, key) = self
            .ids
            .remove(id)
            .ok_or_else(|| ControlError::not_found("budget", id))?;
        let (_, budget) = self
            .budgets
            .remove(&key)
            .ok_or_else(|| ControlError::not_found("budget", id))?;
        debug!(budget_id = id, scope = %budget.scope, "Budget deleted");
        Ok(budget)
    }
}

fn validate(limit: f64, alert_threshold: f64) -> Result<()> {
    if !limit.is_finite() || limit <= 0.0 {
        return Err(ControlError::validation(format!(
            "budget limit must be positive, got {}",
            limit
        )));
    }
    if !(0.0..=1.0).contains(&alert_threshold) {
        return Err(ControlError::validation(format!(
            "alert threshold must be within [0, 1], got {}",
            alert_threshold
        )));
    }
    Ok(())
}

/// Lazy period reset; every accessor calls this first.
///
/// `reset_at` advances in whole periods along the budget's schedule, so a
/// long idle gap collapses into a single reset.
fn roll_over(budget: &mut Budget, now: DateTime<Utc>) {
    if now < budget.reset_at {
        return;
    }
    let mut periods = budget.periods.saturating_add(1);
    let mut next = budget.period.boundary(budget.anchor, periods);
    while next <= now && periods < u32::MAX {
        periods += 1;
        next = budget.period.boundary(budget.anchor, periods);
    }
    debug!(
        budget_id = %budget.id,
        previous_reset = %budget.reset_at,
        next_reset = %next,
        "Budget period rolled over"
    );
    budget.current = 0.0;
    budget.alert_state = AlertState::Clear;
    budget.periods = periods;
    budget.reset_at = next;
}

/// Alert for a consume that moved usage from `previous` to `budget.current`.
///
/// Fires only on an upward crossing; the alert state keeps each level to once
/// per period.
fn next_alert(budget: &mut Budget, previous: f64) -> Option<AlertLevel> {
    let current = budget.current;
    let crossed = |level: f64| previous < level && current >= level;

    if crossed(budget.limit) {
        if budget.alert_state == AlertState::Critical {
            return None;
        }
        budget.alert_state = AlertState::Critical;
        return Some(AlertLevel::Critical);
    }
    if crossed(budget.alert_threshold * budget.limit) && budget.alert_state == AlertState::Clear
    {
        budget.alert_state = AlertState::Warned;
        return Some(AlertLevel::Warning);
    }
    None
}
