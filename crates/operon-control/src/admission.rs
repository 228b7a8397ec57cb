//! Admission control: rate limits and budgets combined into one decision.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::budget::{BudgetLedger, BudgetStatus, BudgetType};
use crate::rate_limit::RateLimiter;
use crate::scope::Scope;

/// Pre-execution estimates for one invocation
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AdmissionRequest {
    pub estimated_tokens: f64,
    pub estimated_cost: f64,
}

impl AdmissionRequest {
    pub fn new(estimated_tokens: f64, estimated_cost: f64) -> Self {
        Self {
            estimated_tokens,
            estimated_cost,
        }
    }
}

/// Actual post-execution consumption
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Usage {
    pub tokens: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "budget", rename_all = "snake_case")]
pub enum DenialKind {
    RateLimited,
    BudgetExceeded(BudgetType),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdmissionDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denial: Option<DenialKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<Duration>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl AdmissionDecision {
    fn deny(kind: DenialKind, reason: Option<String>, warnings: Vec<String>) -> Self {
        Self {
            allowed: false,
            denial: Some(kind),
            reason,
            warnings,
            ..Self::default()
        }
    }
}

/// Decides whether an invocation may proceed, before any hook or executor
/// work happens.
///
/// Agent scopes also answer to the global scope's rate limit and budgets.
/// Admission only reads; callers report actual usage through
/// [`AdmissionController::commit`] once the invocation finishes.
pub struct AdmissionController {
    budgets: Arc<BudgetLedger>,
    rate_limiter: Arc<RateLimiter>,
}

impl AdmissionController {
    pub fn new(budgets: Arc<BudgetLedger>, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            budgets,
            rate_limiter,
        }
    }

    pub fn budgets(&self) -> &Arc<BudgetLedger> {
        &self.budgets
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn admit(&self, scope: &Scope, request: AdmissionRequest) -> AdmissionDecision {
        let chain = scope_chain(scope);

        for s in &chain {
            let check = self.rate_limiter.check(s);
            if !check.allowed {
                info!(scope = %scope, limited_by = %s, reason = ?check.reason, "Admission denied");
                let mut decision =
                    AdmissionDecision::deny(DenialKind::RateLimited, check.reason, Vec::new());
                decision.retry_after = check.retry_after;
                return decision;
            }
        }

        let mut warnings = Vec::new();
        for s in &chain {
            for (budget_type, amount) in [
                (BudgetType::Token, request.estimated_tokens),
                (BudgetType::Cost, request.estimated_cost),
                (BudgetType::Calls, 1.0),
            ] {
                let check = self.budgets.check(s, budget_type, amount);
                if !check.allowed {
                    info!(
                        scope = %scope,
                        limited_by = %s,
                        budget_type = %budget_type,
                        reason = ?check.reason,
                        "Admission denied"
                    );
                    let mut decision = AdmissionDecision::deny(
                        DenialKind::BudgetExceeded(budget_type),
                        check.reason,
                        warnings,
                    );
                    decision.remaining = check.remaining;
                    return decision;
                }
                warnings.extend(check.warning);
            }
        }

        AdmissionDecision {
            allowed: true,
            warnings,
            ..AdmissionDecision::default()
        }
    }

    /// Record the call and consume actual usage against every budget in scope
    pub fn commit(&self, scope: &Scope, usage: Usage) -> Vec<BudgetStatus> {
        let mut statuses = Vec::new();
        for s in scope_chain(scope) {
            self.rate_limiter.record(&s);
            for (budget_type, amount) in [
                (BudgetType::Token, usage.tokens),
                (BudgetType::Cost, usage.cost),
                (BudgetType::Calls, 1.0),
            ] {
                statuses.extend(self.budgets.consume(&s, budget_type, amount));
            }
        }
        statuses
    }
}

fn scope_chain(scope: &Scope) -> Vec<Scope> {
    if scope.is_global() {
        vec![Scope::Global]
    } else {
        vec![scope.clone(), Scope::Global]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{BudgetPeriod, BudgetSpec};
    use crate::clock::ManualClock;
    use crate::rate_limit::RateLimitPolicy;
    use chrono::{TimeZone, Utc};

    fn controller() -> (Arc<ManualClock>, AdmissionController) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let budgets = Arc::new(BudgetLedger::new(clock.clone()));
        let limiter = Arc::new(RateLimiter::new(clock.clone()));
        (clock, AdmissionController::new(budgets, limiter))
    }

    fn agent() -> Scope {
        Scope::agent("researcher")
    }

    #[test]
    fn test_unconfigured_scope_is_admitted() {
        let (_, admission) = controller();
        let decision = admission.admit(&agent(), AdmissionRequest::new(10_000.0, 5.0));
        assert!(decision.allowed);
        assert!(decision.warnings.is_empty());
    }

    #[test]
    fn test_rate_limit_denies_first() {
        let (_, admission) = controller();
        admission
            .rate_limiter()
            .set(agent(), RateLimitPolicy::new(1, 10));
        admission
            .budgets()
            .create(BudgetSpec::new(agent(), BudgetType::Token, 1.0, BudgetPeriod::Day))
            .unwrap();

        admission.commit(&agent(), Usage::default());
        let decision = admission.admit(&agent(), AdmissionRequest::new(100.0, 0.0));
        assert!(!decision.allowed);
        assert_eq!(decision.denial, Some(DenialKind::RateLimited));
        assert!(decision.retry_after.is_some());
    }

    #[test]
    fn test_budget_denial_carries_reason_and_remaining() {
        let (_, admission) = controller();
        admission
            .budgets()
            .create(BudgetSpec::new(agent(), BudgetType::Token, 1000.0, BudgetPeriod::Day))
            .unwrap();
        admission.commit(
            &agent(),
            Usage {
                tokens: 900.0,
                cost: 0.0,
            },
        );

        let decision = admission.admit(&agent(), AdmissionRequest::new(150.0, 0.0));
        assert!(!decision.allowed);
        assert_eq!(
            decision.denial,
            Some(DenialKind::BudgetExceeded(BudgetType::Token))
        );
        assert_eq!(decision.remaining, Some(100.0));
        let reason = decision.reason.unwrap();
        assert!(reason.contains("token budget exceeded"));
        assert!(reason.contains("900/1000"));
    }

    #[test]
    fn test_unenforced_budgets_collect_warnings() {
        let (_, admission) = controller();
        admission
            .budgets()
            .create(
                BudgetSpec::new(agent(), BudgetType::Cost, 1.0, BudgetPeriod::Hour)
                    .enforce_limit(false),
            )
            .unwrap();

        let decision = admission.admit(&agent(), AdmissionRequest::new(0.0, 2.5));
        assert!(decision.allowed);
        assert_eq!(decision.warnings.len(), 1);
        assert!(decision.warnings[0].contains("cost budget exceeded"));
    }

    #[test]
    fn test_global_scope_applies_to_agents() {
        let (_, admission) = controller();
        admission
            .budgets()
            .create(BudgetSpec::new(Scope::Global, BudgetType::Calls, 2.0, BudgetPeriod::Day))
            .unwrap();

        admission.commit(&Scope::agent("a"), Usage::default());
        admission.commit(&Scope::agent("b"), Usage::default());

        let decision = admission.admit(&Scope::agent("c"), AdmissionRequest::default());
        assert!(!decision.allowed);
        assert_eq!(
            decision.denial,
            Some(DenialKind::BudgetExceeded(BudgetType::Calls))
        );
    }

    #[test]
    fn test_commit_uses_actuals_not_estimates() {
        let (_, admission) = controller();
        admission
            .budgets()
            .create(BudgetSpec::new(agent(), BudgetType::Token, 1000.0, BudgetPeriod::Day))
            .unwrap();

        let decision = admission.admit(&agent(), AdmissionRequest::new(800.0, 0.0));
        assert!(decision.allowed);
        assert_eq!(
            admission.budgets().status(&agent(), BudgetType::Token).unwrap().current,
            0.0
        );

        let statuses = admission.commit(
            &agent(),
            Usage {
                tokens: 120.0,
                cost: 0.01,
            },
        );
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].current, 120.0);
    }
}
