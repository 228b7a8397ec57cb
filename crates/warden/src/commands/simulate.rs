use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use operon_control::{
    handler_fn, ControlPlaneConfig, Hook, HookContext, HookEvent, HookResult,
    InvocationExecutor, InvocationKind, InvocationOutcome, InvocationOutput, InvocationRequest,
    Scope, TelemetryEvent,
};
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use super::build_plane;

pub struct SimulateOptions {
    pub scope: String,
    pub target: String,
    pub calls: u32,
    pub tokens: u64,
    pub cost: f64,
    pub interval_ms: u64,
}

/// Executor that echoes its input and reports a fixed consumption
struct EchoExecutor {
    tokens: u64,
    cost: f64,
}

#[async_trait]
impl InvocationExecutor for EchoExecutor {
    async fn execute(&self, _request: &InvocationRequest, input: Value) -> Result<InvocationOutput> {
        Ok(InvocationOutput {
            output: json!({ "echo": input }),
            output_tokens: self.tokens,
            cost: self.cost,
            success: true,
        })
    }
}

pub async fn execute(options: SimulateOptions, config: &ControlPlaneConfig) -> Result<()> {
    let plane = build_plane(config)?;
    let scope: Scope = options.scope.parse()?;

    // Audit hook on every admitted tool call
    plane.hooks.register(Hook::new(
        "audit",
        HookEvent::ToolBefore,
        100,
        handler_fn(|ctx: HookContext| async move {
            info!(
                scope = ?ctx.scope,
                invocation_id = ?ctx.metadata.get("invocation_id"),
                "Tool call audit"
            );
            anyhow::Ok(HookResult::pass())
        }),
    ))?;

    let mut telemetry = plane.telemetry.subscribe();
    let alerts = tokio::spawn(async move {
        loop {
            match telemetry.recv().await {
                Ok(TelemetryEvent::BudgetAlert(alert)) => {
                    eprintln!("{}", serde_json::to_string(&alert).unwrap_or_default());
                }
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let executor = Arc::new(EchoExecutor {
        tokens: options.tokens,
        cost: options.cost,
    });
    let orchestrator = plane.orchestrator(executor);

    let estimated_tokens = options.tokens as f64;
    for call in 1..=options.calls {
        let request = InvocationRequest::new(
            InvocationKind::Tool,
            scope.clone(),
            options.target.clone(),
            json!({ "call": call }),
        )
        .with_estimates(estimated_tokens, options.cost);

        let report = orchestrator.invoke(request).await;
        let line = match &report.outcome {
            InvocationOutcome::Denied(decision) => json!({
                "call": call,
                "outcome": "denied",
                "reason": decision.reason,
                "remaining": decision.remaining,
                "retry_after_ms": decision.retry_after.map(|d| d.as_millis() as u64),
            }),
            InvocationOutcome::Failed { error, .. } => json!({
                "call": call,
                "outcome": "failed",
                "error": error,
            }),
            outcome => json!({
                "call": call,
                "outcome": outcome.label(),
                "warnings": report.warnings,
            }),
        };
        println!("{}", line);

        if options.interval_ms > 0 {
            tokio::time::sleep(Duration::from_millis(options.interval_ms)).await;
        }
    }

    let statuses: Vec<_> = plane
        .budgets
        .list(None)
        .iter()
        .map(|b| b.status())
        .collect();
    println!("{}", serde_json::to_string_pretty(&json!({ "budgets": statuses }))?);

    // Closing every sender ends the alert printer once it has drained
    drop(orchestrator);
    drop(plane);
    if let Err(e) = alerts.await {
        warn!(error = %e, "Alert printer task failed");
    }
    Ok(())
}
