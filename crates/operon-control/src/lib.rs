pub mod admission;
pub mod budget;
pub mod clock;
pub mod config;
pub mod error;
pub mod hooks;
pub mod orchestrator;
pub mod plane;
pub mod rate_limit;
pub mod scope;
pub mod telemetry;

pub use admission::{AdmissionController, AdmissionDecision, AdmissionRequest, DenialKind, Usage};
pub use budget::{
    AlertLevel, Budget, BudgetAlert, BudgetCheck, BudgetLedger, BudgetPeriod, BudgetSpec,
    BudgetStatus, BudgetType, BudgetUpdate,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ControlPlaneConfig, HooksConfig, InvocationConfig, RateLimitEntry, TelemetryConfig};
pub use error::{ControlError, Result};
pub use hooks::{
    handler_fn, ExecuteOptions, Hook, HookContext, HookEvent, HookExecutionResult, HookHandler,
    HookRegistry, HookResult, HookRunRecord, HookStatus,
};
pub use orchestrator::{
    InvocationExecutor, InvocationKind, InvocationOrchestrator, InvocationOutcome,
    InvocationOutput, InvocationReport, InvocationRequest,
};
pub use plane::ControlPlane;
pub use rate_limit::{RateLimitCheck, RateLimitPolicy, RateLimiter};
pub use scope::Scope;
pub use telemetry::{HookSummary, InvocationSummary, TelemetryEvent, TelemetrySink};

/// Initialize structured JSON logging on stderr, leaving stdout for output
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    fmt()
        .json()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}
