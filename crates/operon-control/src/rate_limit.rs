//! Sliding-window call limiter with a burst allowance.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::Clock;
use crate::scope::Scope;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub max_calls_per_minute: u32,
    pub max_calls_per_hour: u32,
    /// Added to the per-minute ceiling; no separate refill
    #[serde(default)]
    pub burst_allowance: u32,
}

impl RateLimitPolicy {
    pub fn new(max_calls_per_minute: u32, max_calls_per_hour: u32) -> Self {
        Self {
            max_calls_per_minute,
            max_calls_per_hour,
            burst_allowance: 0,
        }
    }

    pub fn with_burst(mut self, burst_allowance: u32) -> Self {
        self.burst_allowance = burst_allowance;
        self
    }

    pub fn minute_ceiling(&self) -> u32 {
        self.max_calls_per_minute.saturating_add(self.burst_allowance)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RateLimitCheck {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub per_minute_count: u32,
    pub per_hour_count: u32,
    /// Earliest time a denied call could succeed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<Duration>,
}

/// Per-scope call histories checked against per-scope policies.
///
/// Histories are pruned lazily; nothing older than one hour is kept.
pub struct RateLimiter {
    policies: DashMap<Scope, RateLimitPolicy>,
    history: DashMap<Scope, VecDeque<DateTime<Utc>>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            policies: DashMap::new(),
            history: DashMap::new(),
            clock,
        }
    }

    /// Install `policy` for `scope`, replacing any existing one
    pub fn set(&self, scope: Scope, policy: RateLimitPolicy) {
        debug!(
            scope = %scope,
            per_minute = policy.max_calls_per_minute,
            per_hour = policy.max_calls_per_hour,
            burst = policy.burst_allowance,
            "Rate limit set"
        );
        self.policies.insert(scope, policy);
    }

    pub fn get(&self, scope: &Scope) -> Option<RateLimitPolicy> {
        self.policies.get(scope).map(|p| *p)
    }

    /// Drop the scope's policy along with its call history
    pub fn remove(&self, scope: &Scope) -> Option<RateLimitPolicy> {
        self.history.remove(scope);
        self.policies.remove(scope).map(|(_, policy)| policy)
    }

    /// All configured policies, ordered by scope
    pub fn policies(&self) -> Vec<(Scope, RateLimitPolicy)> {
        let mut policies: Vec<_> = self
            .policies
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        policies.sort_by(|a, b| a.0.cmp(&b.0));
        policies
    }

    /// Append a call timestamp to the scope's history.
    ///
    /// Scopes without a policy keep no history.
    pub fn record(&self, scope: &Scope) {
        if !self.policies.contains_key(scope) {
            return;
        }
        let now = self.clock.now();
        let mut calls = self.history.entry(scope.clone()).or_default();
        prune(&mut calls, now);
        calls.push_back(now);
    }

    /// Check whether one more call fits the scope's policy
    pub fn check(&self, scope: &Scope) -> RateLimitCheck {
        let Some(policy) = self.get(scope) else {
            return RateLimitCheck {
                allowed: true,
                ..RateLimitCheck::default()
            };
        };

        let now = self.clock.now();
        let mut calls = self.history.entry(scope.clone()).or_default();
        prune(&mut calls, now);

        let minute_start = now - minute();
        let in_minute: Vec<DateTime<Utc>> = calls
            .iter()
            .copied()
            .filter(|t| *t > minute_start)
            .collect();
        let per_hour = calls.len() as u32;
        let per_minute = in_minute.len() as u32;

        let mut check = RateLimitCheck {
            allowed: true,
            reason: None,
            per_minute_count: per_minute,
            per_hour_count: per_hour,
            retry_after: None,
        };

        if per_hour >= policy.max_calls_per_hour {
            let excess = (per_hour - policy.max_calls_per_hour) as usize;
            check.allowed = false;
            check.reason = Some(format!(
                "rate limit exceeded for {}: {}/{} calls in the last hour",
                scope, per_hour, policy.max_calls_per_hour
            ));
            check.retry_after = calls.get(excess).map(|t| until(*t + hour(), now));
        } else if per_minute >= policy.minute_ceiling() {
            let excess = (per_minute - policy.minute_ceiling()) as usize;
            check.allowed = false;
            check.reason = Some(format!(
                "rate limit exceeded for {}: {}/{} calls in the last minute ({} burst)",
                scope,
                per_minute,
                policy.minute_ceiling(),
                policy.burst_allowance
            ));
            check.retry_after = in_minute.get(excess).map(|t| until(*t + minute(), now));
        }

        check
    }

    /// Prune every history and drop the empty ones (call periodically)
    pub fn cleanup(&self) {
        let now = self.clock.now();
        self.history.retain(|_, calls| {
            prune(calls, now);
            !calls.is_empty()
        });
    }

    pub fn tracked_scopes(&self) -> usize {
        self.history.len()
    }
}

fn minute() -> chrono::Duration {
    chrono::Duration::from_std(MINUTE).unwrap_or_else(|_| chrono::Duration::seconds(60))
}

fn hour() -> chrono::Duration {
    chrono::Duration::from_std(HOUR).unwrap_or_else(|_| chrono::Duration::seconds(3600))
}

fn until(at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (at - now).to_std().unwrap_or(Duration::ZERO)
}

fn prune(calls: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
    let cutoff = now - hour();
    while calls.front().is_some_and(|t| *t <= cutoff) {
        calls.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn limiter() -> (Arc<ManualClock>, RateLimiter) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let limiter = RateLimiter::new(clock.clone());
        (clock, limiter)
    }

    fn call(limiter: &RateLimiter, scope: &Scope) -> bool {
        let check = limiter.check(scope);
        if check.allowed {
            limiter.record(scope);
        }
        check.allowed
    }

    #[test]
    fn test_no_policy_allows_everything() {
        let (_, limiter) = limiter();
        let scope = Scope::agent("free");
        for _ in 0..1000 {
            assert!(call(&limiter, &scope));
        }
        assert_eq!(limiter.tracked_scopes(), 0);
    }

    #[test]
    fn test_burst_raises_minute_ceiling() {
        let (clock, limiter) = limiter();
        let scope = Scope::agent("bursty");
        limiter.set(scope.clone(), RateLimitPolicy::new(10, 100).with_burst(5));

        for i in 0..15 {
            assert!(call(&limiter, &scope), "call {} should be allowed", i + 1);
            clock.advance(Duration::from_secs(1));
        }
        let denied = limiter.check(&scope);
        assert!(!denied.allowed);
        assert_eq!(denied.per_minute_count, 15);
        assert!(denied.reason.unwrap().contains("last minute"));

        // First call was at t=0, now is t=15s
        assert_eq!(denied.retry_after, Some(Duration::from_secs(45)));

        clock.advance(Duration::from_secs(60));
        assert!(call(&limiter, &scope));
    }

    #[test]
    fn test_window_reopens_exactly_after_sixty_seconds() {
        let (clock, limiter) = limiter();
        let scope = Scope::agent("a");
        limiter.set(scope.clone(), RateLimitPolicy::new(2, 100));
        assert!(call(&limiter, &scope));
        assert!(call(&limiter, &scope));
        assert!(!call(&limiter, &scope));

        clock.advance(Duration::from_secs(59));
        assert!(!call(&limiter, &scope));
        clock.advance(Duration::from_secs(1));
        assert!(call(&limiter, &scope));
    }

    #[test]
    fn test_hourly_limit() {
        let (clock, limiter) = limiter();
        let scope = Scope::Global;
        limiter.set(scope.clone(), RateLimitPolicy::new(10, 20));

        for _ in 0..20 {
            assert!(call(&limiter, &scope));
            clock.advance(Duration::from_secs(61));
        }
        let check = limiter.check(&scope);
        assert!(!check.allowed);
        assert_eq!(check.per_hour_count, 20);
        assert!(check.reason.unwrap().contains("last hour"));

        clock.advance(Duration::from_secs(3600));
        assert!(call(&limiter, &scope));
        assert_eq!(limiter.check(&scope).per_hour_count, 1);
    }

    #[test]
    fn test_scopes_are_independent() {
        let (_, limiter) = limiter();
        let a = Scope::agent("a");
        let b = Scope::agent("b");
        limiter.set(a.clone(), RateLimitPolicy::new(1, 10));
        limiter.set(b.clone(), RateLimitPolicy::new(1, 10));

        assert!(call(&limiter, &a));
        assert!(!call(&limiter, &a));
        assert!(call(&limiter, &b));
    }

    #[test]
    fn test_set_replaces_policy() {
        let (_, limiter) = limiter();
        let scope = Scope::agent("a");
        limiter.set(scope.clone(), RateLimitPolicy::new(1, 10));
        assert!(call(&limiter, &scope));
        assert!(!call(&limiter, &scope));

        limiter.set(scope.clone(), RateLimitPolicy::new(5, 10));
        assert!(call(&limiter, &scope));
        assert_eq!(limiter.get(&scope).unwrap().max_calls_per_minute, 5);

        limiter.remove(&scope);
        assert!(limiter.get(&scope).is_none());
    }

    #[test]
    fn test_cleanup_drops_idle_histories() {
        let (clock, limiter) = limiter();
        limiter.set(Scope::agent("old"), RateLimitPolicy::new(10, 100));
        limiter.set(Scope::agent("recent"), RateLimitPolicy::new(10, 100));
        limiter.record(&Scope::agent("old"));
        clock.advance(Duration::from_secs(1800));
        limiter.record(&Scope::agent("recent"));
        clock.advance(Duration::from_secs(1800));

        limiter.cleanup();
        assert_eq!(limiter.tracked_scopes(), 1);
    }

    #[test]
    fn test_remove_forgets_history() {
        let (_, limiter) = limiter();
        let scope = Scope::agent("gone");
        limiter.set(scope.clone(), RateLimitPolicy::new(1, 10));
        assert!(call(&limiter, &scope));
        assert_eq!(limiter.tracked_scopes(), 1);

        limiter.remove(&scope);
        assert_eq!(limiter.tracked_scopes(), 0);
        limiter.record(&scope);
        assert_eq!(limiter.tracked_scopes(), 0);
    }
}
