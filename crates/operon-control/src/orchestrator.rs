//! Invocation orchestrator: admit, run hooks around the executor, commit usage.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::admission::{AdmissionController, AdmissionDecision, AdmissionRequest, Usage};
use crate::hooks::{ExecuteOptions, HookContext, HookEvent, HookRegistry};
use crate::scope::Scope;
use crate::telemetry::{InvocationSummary, TelemetryEvent, TelemetrySink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationKind {
    Tool,
    Agent,
    Workflow,
    WorkflowStep,
}

impl InvocationKind {
    pub fn before_event(&self) -> HookEvent {
        match self {
            InvocationKind::Tool => HookEvent::ToolBefore,
            InvocationKind::Agent => HookEvent::AgentBefore,
            InvocationKind::Workflow => HookEvent::WorkflowBefore,
            InvocationKind::WorkflowStep => HookEvent::WorkflowStepBefore,
        }
    }

    pub fn after_event(&self) -> HookEvent {
        match self {
            InvocationKind::Tool => HookEvent::ToolAfter,
            InvocationKind::Agent => HookEvent::AgentAfter,
            InvocationKind::Workflow => HookEvent::WorkflowAfter,
            InvocationKind::WorkflowStep => HookEvent::WorkflowStepAfter,
        }
    }

    /// Steps have no error event of their own and report as workflow errors
    pub fn error_event(&self) -> HookEvent {
        match self {
            InvocationKind::Tool => HookEvent::ToolError,
            InvocationKind::Agent => HookEvent::AgentError,
            InvocationKind::Workflow | InvocationKind::WorkflowStep => HookEvent::WorkflowError,
        }
    }
}

/// One agent/tool/workflow call to be admitted and executed
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub kind: InvocationKind,
    pub scope: Scope,
    /// Tool, agent or workflow name
    pub target: String,
    pub input: Value,
    pub estimates: AdmissionRequest,
    pub metadata: Map<String, Value>,
}

impl InvocationRequest {
    pub fn new(kind: InvocationKind, scope: Scope, target: impl Into<String>, input: Value) -> Self {
        Self {
            kind,
            scope,
            target: target.into(),
            input,
            estimates: AdmissionRequest::default(),
            metadata: Map::new(),
        }
    }

    pub fn with_estimates(mut self, tokens: f64, cost: f64) -> Self {
        self.estimates = AdmissionRequest::new(tokens, cost);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// What the executor reports back
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationOutput {
    pub output: Value,
    pub output_tokens: u64,
    pub cost: f64,
    pub success: bool,
}

/// Performs the actual work of an admitted invocation
#[async_trait]
pub trait InvocationExecutor: Send + Sync {
    /// Execute with the input produced by the `before` hooks
    async fn execute(&self, request: &InvocationRequest, input: Value) -> Result<InvocationOutput>;
}

#[derive(Debug, Clone)]
pub enum InvocationOutcome {
    Denied(AdmissionDecision),
    /// A `before` hook stopped the invocation; nothing was executed
    Aborted,
    Completed { output: Value, usage: Usage },
    Failed { error: String, usage: Usage },
}

impl InvocationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            InvocationOutcome::Denied(_) => "denied",
            InvocationOutcome::Aborted => "aborted",
            InvocationOutcome::Completed { .. } => "completed",
            InvocationOutcome::Failed { .. } => "failed",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, InvocationOutcome::Completed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct InvocationReport {
    pub invocation_id: String,
    pub outcome: InvocationOutcome,
    /// Non-enforced budget overruns seen at admission
    pub warnings: Vec<String>,
    pub hook_failures: usize,
    pub duration: Duration,
}

/// Wraps every invocation in admission control and the hook pipeline.
pub struct InvocationOrchestrator {
    admission: Arc<AdmissionController>,
    hooks: Arc<HookRegistry>,
    executor: Arc<dyn InvocationExecutor>,
    hook_options: ExecuteOptions,
    invocation_timeout: Option<Duration>,
    telemetry: Option<TelemetrySink>,
}

impl InvocationOrchestrator {
    pub fn new(
        admission: Arc<AdmissionController>,
        hooks: Arc<HookRegistry>,
        executor: Arc<dyn InvocationExecutor>,
    ) -> Self {
        Self {
            admission,
            hooks,
            executor,
            hook_options: ExecuteOptions::default(),
            invocation_timeout: None,
            telemetry: None,
        }
    }

    pub fn with_hook_options(mut self, options: ExecuteOptions) -> Self {
        self.hook_options = options;
        self
    }

    /// Deadline for the executor call; expiry counts as a failure
    pub fn with_invocation_timeout(mut self, timeout: Duration) -> Self {
        self.invocation_timeout = Some(timeout);
        self
    }

    pub fn with_telemetry(mut self, sink: TelemetrySink) -> Self {
        self.telemetry = Some(sink);
        self
    }

    pub async fn invoke(&self, request: InvocationRequest) -> InvocationReport {
        let started = Instant::now();
        let invocation_id = uuid::Uuid::new_v4().to_string();
        let scope = request.scope.clone();

        let decision = self.admission.admit(&scope, request.estimates);
        if !decision.allowed {
            return self.finish(
                &request,
                invocation_id,
                InvocationOutcome::Denied(decision),
                Vec::new(),
                0,
                started,
            );
        }
        let warnings = decision.warnings;

        let mut metadata = request.metadata.clone();
        metadata.insert("invocation_id".into(), json!(invocation_id));
        metadata.insert("target".into(), json!(request.target));

        let mut before_ctx = HookContext::new(request.kind.before_event(), request.input.clone())
            .with_scope(scope.clone());
        before_ctx.metadata = metadata;

        let before = self
            .hooks
            .execute(request.kind.before_event(), before_ctx, &self.hook_options)
            .await;
        let mut hook_failures = before.failures;

        if before.aborted {
            info!(invocation_id = %invocation_id, name = %request.target, "Invocation aborted by hook");
            return self.finish(
                &request,
                invocation_id,
                InvocationOutcome::Aborted,
                warnings,
                hook_failures,
                started,
            );
        }

        let input = before.transformed_input;
        let result = self.run_executor(&request, input.clone()).await;

        let outcome = match result {
            Ok(out) if out.success => {
                let usage = Usage {
                    tokens: out.output_tokens as f64,
                    cost: out.cost,
                };
                let mut ctx = HookContext::new(request.kind.after_event(), input)
                    .with_scope(scope.clone())
                    .with_output(out.output.clone());
                ctx.metadata = before.metadata;
                let after = self
                    .hooks
                    .execute(request.kind.after_event(), ctx, &self.hook_options)
                    .await;
                hook_failures += after.failures;
                InvocationOutcome::Completed {
                    output: after.transformed_output.unwrap_or(out.output),
                    usage,
                }
            }
            Ok(out) => {
                let usage = Usage {
                    tokens: out.output_tokens as f64,
                    cost: out.cost,
                };
                let error = format!("{} reported failure", request.target);
                let mut ctx = HookContext::new(request.kind.error_event(), input)
                    .with_scope(scope.clone())
                    .with_output(out.output)
                    .with_error(error.clone());
                ctx.metadata = before.metadata;
                hook_failures += self.run_error_hooks(&request, ctx).await;
                InvocationOutcome::Failed { error, usage }
            }
            Err(e) => {
                let error = e.to_string();
                warn!(name = %request.target, error = %error, "Invocation failed");
                let mut ctx = HookContext::new(request.kind.error_event(), input)
                    .with_scope(scope.clone())
                    .with_error(error.clone());
                ctx.metadata = before.metadata;
                hook_failures += self.run_error_hooks(&request, ctx).await;
                InvocationOutcome::Failed {
                    error,
                    usage: Usage::default(),
                }
            }
        };

        let usage = match &outcome {
            InvocationOutcome::Completed { usage, .. } | InvocationOutcome::Failed { usage, .. } => {
                *usage
            }
            _ => Usage::default(),
        };
        self.admission.commit(&scope, usage);

        self.finish(&request, invocation_id, outcome, warnings, hook_failures, started)
    }

    async fn run_executor(&self, request: &InvocationRequest, input: Value) -> Result<InvocationOutput> {
        let execution = self.executor.execute(request, input);
        match self.invocation_timeout {
            Some(timeout) => tokio::time::timeout(timeout, execution)
                .await
                .map_err(|_| anyhow!("{} timed out after {}ms", request.target, timeout.as_millis()))?,
            None => execution.await,
        }
    }

    async fn run_error_hooks(&self, request: &InvocationRequest, ctx: HookContext) -> usize {
        self.hooks
            .execute(request.kind.error_event(), ctx, &self.hook_options)
            .await
            .failures
    }

    fn finish(
        &self,
        request: &InvocationRequest,
        invocation_id: String,
        outcome: InvocationOutcome,
        warnings: Vec<String>,
        hook_failures: usize,
        started: Instant,
    ) -> InvocationReport {
        let duration = started.elapsed();
        info!(
            invocation_id = %invocation_id,
            scope = %request.scope,
            name = %request.target,
            outcome = outcome.label(),
            duration_ms = duration.as_millis() as u64,
            "Invocation finished"
        );

        if let Some(sink) = &self.telemetry {
            sink.emit(TelemetryEvent::InvocationFinished(InvocationSummary {
                invocation_id: invocation_id.clone(),
                scope: request.scope.clone(),
                target: request.target.clone(),
                outcome: outcome.label().to_string(),
                duration_ms: duration.as_millis() as u64,
            }));
        }

        InvocationReport {
            invocation_id,
            outcome,
            warnings,
            hook_failures,
            duration,
        }
    }
}
