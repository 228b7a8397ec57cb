//! Outbound telemetry channel for alerts and execution summaries.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::budget::BudgetAlert;
use crate::hooks::HookEvent;
use crate::scope::Scope;

/// Summary of one `execute_hooks` pass
#[derive(Debug, Clone, Serialize)]
pub struct HookSummary {
    pub event: HookEvent,
    pub hooks_run: usize,
    pub failures: usize,
    pub aborted: bool,
    pub total_duration_ms: u64,
}

/// Summary of one orchestrated invocation
#[derive(Debug, Clone, Serialize)]
pub struct InvocationSummary {
    pub invocation_id: String,
    pub scope: Scope,
    pub target: String,
    pub outcome: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    BudgetAlert(BudgetAlert),
    HookSummary(HookSummary),
    InvocationFinished(InvocationSummary),
}

/// Fire-and-forget sink backed by a bounded broadcast channel.
///
/// Slow subscribers lag and lose old events; emitters never block.
#[derive(Clone)]
pub struct TelemetrySink {
    tx: broadcast::Sender<TelemetryEvent>,
}

impl TelemetrySink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: TelemetryEvent) {
        if self.tx.send(event).is_err() {
            debug!("Telemetry event dropped: no subscribers");
        }
    }
}

impl Default for TelemetrySink {
    fn default() -> Self {
        Self::new(256)
    }
}
