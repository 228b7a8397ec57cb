use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::admission::AdmissionController;
use crate::budget::BudgetLedger;
use crate::clock::Clock;
use crate::config::ControlPlaneConfig;
use crate::error::Result;
use crate::hooks::{ExecuteOptions, HookRegistry};
use crate::orchestrator::{InvocationExecutor, InvocationOrchestrator};
use crate::rate_limit::RateLimiter;
use crate::telemetry::TelemetrySink;

/// All control-plane services wired together over one clock and one
/// telemetry sink.
pub struct ControlPlane {
    pub clock: Arc<dyn Clock>,
    pub telemetry: TelemetrySink,
    pub hooks: Arc<HookRegistry>,
    pub budgets: Arc<BudgetLedger>,
    pub rate_limiter: Arc<RateLimiter>,
    pub admission: Arc<AdmissionController>,
    hook_options: ExecuteOptions,
    invocation_timeout: Option<Duration>,
}

impl ControlPlane {
    /// Build the services and apply the configured budgets and rate limits
    pub fn from_config(config: &ControlPlaneConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let telemetry = TelemetrySink::new(config.telemetry.channel_capacity);
        let hooks = Arc::new(HookRegistry::new().with_telemetry(telemetry.clone()));
        let budgets = Arc::new(BudgetLedger::new(clock.clone()).with_telemetry(telemetry.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(clock.clone()));

        for entry in &config.rate_limits {
            rate_limiter.set(entry.scope.clone(), entry.policy());
        }
        for spec in &config.budgets {
            budgets.create(spec.clone())?;
        }

        info!(
            budgets = config.budgets.len(),
            rate_limits = config.rate_limits.len(),
            "Control plane initialized"
        );

        let admission = Arc::new(AdmissionController::new(budgets.clone(), rate_limiter.clone()));
        Ok(Self {
            clock,
            telemetry,
            hooks,
            budgets,
            rate_limiter,
            admission,
            hook_options: config.hooks.execute_options(),
            invocation_timeout: config.invocation.timeout(),
        })
    }

    /// Orchestrator over these services delegating work to `executor`
    pub fn orchestrator(&self, executor: Arc<dyn InvocationExecutor>) -> InvocationOrchestrator {
        let orchestrator =
            InvocationOrchestrator::new(self.admission.clone(), self.hooks.clone(), executor)
                .with_hook_options(self.hook_options.clone())
                .with_telemetry(self.telemetry.clone());
        match self.invocation_timeout {
            Some(timeout) => orchestrator.with_invocation_timeout(timeout),
            None => orchestrator,
        }
    }
}
