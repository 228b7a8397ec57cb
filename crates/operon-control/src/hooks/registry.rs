use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::events::{HookContext, HookEvent, HookResult};
use super::hook::{Hook, MAX_PRIORITY};
use crate::error::{ControlError, Result};
use crate::telemetry::{HookSummary, TelemetryEvent, TelemetrySink};

pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_millis(500);

/// Options for a single `execute_hooks` pass
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub timeout: Duration,
    /// Halt the remaining chain after the first failed or timed-out hook
    pub stop_on_error: bool,
    /// Populate `HookExecutionResult::hook_results`
    pub collect_results: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_HOOK_TIMEOUT,
            stop_on_error: false,
            collect_results: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HookStatus {
    Success,
    Failed(String),
    TimedOut,
}

impl HookStatus {
    pub fn is_failure(&self) -> bool {
        !matches!(self, HookStatus::Success)
    }
}

/// Outcome of one hook within a chain
#[derive(Debug, Clone)]
pub struct HookRunRecord {
    pub hook_id: String,
    pub status: HookStatus,
    pub duration: Duration,
}

/// Aggregated result of a hook chain
#[derive(Debug, Clone)]
pub struct HookExecutionResult {
    /// Input after the last successful transformation
    pub transformed_input: Value,
    pub transformed_output: Option<Value>,
    pub metadata: Map<String, Value>,
    pub hook_results: Vec<HookRunRecord>,
    pub aborted: bool,
    pub hooks_run: usize,
    pub failures: usize,
    pub total_duration: Duration,
}

#[derive(Default)]
struct RegistryState {
    by_event: HashMap<HookEvent, Vec<Hook>>,
    ids: HashMap<String, HookEvent>,
}

/// Registry for hooks, organized by event type.
///
/// Read-mostly: executions take a snapshot under the read lock and run
/// handlers without holding it.
pub struct HookRegistry {
    state: RwLock<RegistryState>,
    telemetry: Option<TelemetrySink>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            telemetry: None,
        }
    }

    /// Send a `HookSummary` to `sink` after every execution
    pub fn with_telemetry(mut self, sink: TelemetrySink) -> Self {
        self.telemetry = Some(sink);
        self
    }

    /// Register a hook; ids are unique across all events
    pub fn register(&self, hook: Hook) -> Result<()> {
        if hook.id.is_empty() {
            return Err(ControlError::validation("hook id must not be empty"));
        }
        if hook.priority > MAX_PRIORITY {
            return Err(ControlError::validation(format!(
                "hook '{}' priority {} out of range 0..={}",
                hook.id, hook.priority, MAX_PRIORITY
            )));
        }

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.ids.contains_key(&hook.id) {
            return Err(ControlError::validation(format!(
                "hook '{}' already registered",
                hook.id
            )));
        }

        debug!(hook = %hook.id, event = %hook.event, priority = hook.priority, "Hook registered");
        state.ids.insert(hook.id.clone(), hook.event);
        let hooks = state.by_event.entry(hook.event).or_default();
        hooks.push(hook);
        // Stable: equal priorities keep registration order
        hooks.sort_by_key(|h| h.priority);
        Ok(())
    }

    /// Remove a hook by id. Unknown ids are ignored.
    pub fn remove(&self, id: &str) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let Some(event) = state.ids.remove(id) else {
            return;
        };
        if let Some(hooks) = state.by_event.get_mut(&event) {
            hooks.retain(|h| h.id != id);
            if hooks.is_empty() {
                state.by_event.remove(&event);
            }
        }
        debug!(hook = id, event = %event, "Hook removed");
    }

    pub fn clear(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.by_event.clear();
        state.ids.clear();
    }

    /// Hooks for `event` in execution order
    pub fn get_hooks(&self, event: HookEvent) -> Vec<Hook> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.by_event.get(&event).cloned().unwrap_or_default()
    }

    pub fn get_hook(&self, id: &str) -> Option<Hook> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let event = state.ids.get(id)?;
        state
            .by_event
            .get(event)
            .and_then(|hooks| hooks.iter().find(|h| h.id == id).cloned())
    }

    /// Check if any enabled hooks are registered for an event
    pub fn has_hooks(&self, event: HookEvent) -> bool {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .by_event
            .get(&event)
            .map(|hooks| hooks.iter().any(|h| h.enabled))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.state.read().unwrap_or_else(|e| e.into_inner()).ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run the hook chain for `event`.
    ///
    /// Hooks execute sequentially in priority order. Failures, panics and
    /// timeouts are isolated: they are logged, leave the context untouched,
    /// and never reach the caller.
    pub async fn execute(
        &self,
        event: HookEvent,
        mut ctx: HookContext,
        options: &ExecuteOptions,
    ) -> HookExecutionResult {
        let started = Instant::now();
        ctx.event = event;

        let hooks = self.get_hooks(event);
        let mut transformed_output = None;
        let mut hook_results = Vec::new();
        let mut hooks_run = 0;
        let mut failures = 0;

        for hook in hooks.iter().filter(|h| h.enabled) {
            if ctx.aborted {
                break;
            }

            let timeout = hook.timeout.unwrap_or(options.timeout);
            let hook_started = Instant::now();
            let outcome = run_isolated(hook, ctx.clone(), timeout).await;
            let duration = hook_started.elapsed();
            hooks_run += 1;

            let status = match outcome {
                Ok(result) => {
                    if let Some(input) = result.transformed_input {
                        ctx.input = input;
                    }
                    if let Some(output) = result.transformed_output {
                        ctx.output = Some(output.clone());
                        transformed_output = Some(output);
                    }
                    ctx.metadata.extend(result.metadata);
                    if result.abort {
                        debug!(hook = %hook.id, event = %event, "Hook aborted chain");
                        ctx.aborted = true;
                    }
                    HookStatus::Success
                }
                Err(status) => {
                    match &status {
                        HookStatus::TimedOut => warn!(
                            hook = %hook.id,
                            event = %event,
                            timeout_ms = timeout.as_millis() as u64,
                            "Hook timed out"
                        ),
                        HookStatus::Failed(error) => {
                            warn!(hook = %hook.id, event = %event, error = %error, "Hook failed")
                        }
                        HookStatus::Success => {}
                    }
                    failures += 1;
                    status
                }
            };

            let failed = status.is_failure();
            if options.collect_results {
                hook_results.push(HookRunRecord {
                    hook_id: hook.id.clone(),
                    status,
                    duration,
                });
            }
            if failed && options.stop_on_error {
                debug!(hook = %hook.id, event = %event, "Stopping chain after hook failure");
                break;
            }
        }

        let result = HookExecutionResult {
            transformed_input: ctx.input,
            transformed_output,
            metadata: ctx.metadata,
            hook_results,
            aborted: ctx.aborted,
            hooks_run,
            failures,
            total_duration: started.elapsed(),
        };

        if let Some(sink) = &self.telemetry {
            sink.emit(TelemetryEvent::HookSummary(HookSummary {
                event,
                hooks_run: result.hooks_run,
                failures: result.failures,
                aborted: result.aborted,
                total_duration_ms: result.total_duration.as_millis() as u64,
            }));
        }

        result
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one handler on its own task, racing it against `timeout`.
///
/// A handler that loses the race is detached and left to finish on its own.
/// Settling at or after the deadline counts as a timeout.
async fn run_isolated(
    hook: &Hook,
    ctx: HookContext,
    timeout: Duration,
) -> std::result::Result<HookResult, HookStatus> {
    let handler = hook.handler.clone();
    let started = Instant::now();
    let mut task = tokio::spawn(async move { handler.handle(ctx).await });

    match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(Ok(_))) if started.elapsed() >= timeout => Err(HookStatus::TimedOut),
        Ok(Ok(Ok(result))) => Ok(result),
        Ok(Ok(Err(e))) => Err(HookStatus::Failed(e.to_string())),
        Ok(Err(join_err)) => Err(HookStatus::Failed(format!(
            "handler panicked: {}",
            join_err
        ))),
        Err(_) => Err(HookStatus::TimedOut),
    }
}
