use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ControlError;
use crate::scope::Scope;

/// Hook lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookEvent {
    #[serde(rename = "tool:before")]
    ToolBefore,
    #[serde(rename = "tool:after")]
    ToolAfter,
    #[serde(rename = "tool:error")]
    ToolError,
    #[serde(rename = "agent:before")]
    AgentBefore,
    #[serde(rename = "agent:after")]
    AgentAfter,
    #[serde(rename = "agent:error")]
    AgentError,
    #[serde(rename = "workflow:before")]
    WorkflowBefore,
    #[serde(rename = "workflow:after")]
    WorkflowAfter,
    #[serde(rename = "workflow:error")]
    WorkflowError,
    #[serde(rename = "workflow:step:before")]
    WorkflowStepBefore,
    #[serde(rename = "workflow:step:after")]
    WorkflowStepAfter,
}

impl HookEvent {
    pub const ALL: [HookEvent; 11] = [
        HookEvent::ToolBefore,
        HookEvent::ToolAfter,
        HookEvent::ToolError,
        HookEvent::AgentBefore,
        HookEvent::AgentAfter,
        HookEvent::AgentError,
        HookEvent::WorkflowBefore,
        HookEvent::WorkflowAfter,
        HookEvent::WorkflowError,
        HookEvent::WorkflowStepBefore,
        HookEvent::WorkflowStepAfter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::ToolBefore => "tool:before",
            HookEvent::ToolAfter => "tool:after",
            HookEvent::ToolError => "tool:error",
            HookEvent::AgentBefore => "agent:before",
            HookEvent::AgentAfter => "agent:after",
            HookEvent::AgentError => "agent:error",
            HookEvent::WorkflowBefore => "workflow:before",
            HookEvent::WorkflowAfter => "workflow:after",
            HookEvent::WorkflowError => "workflow:error",
            HookEvent::WorkflowStepBefore => "workflow:step:before",
            HookEvent::WorkflowStepAfter => "workflow:step:after",
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookEvent {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HookEvent::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| ControlError::validation(format!("unknown hook event '{}'", s)))
    }
}

/// Context threaded through one hook chain.
///
/// Owned by a single `execute_hooks` call; handlers receive a snapshot and
/// report changes through [`HookResult`].
#[derive(Debug, Clone)]
pub struct HookContext {
    pub event: HookEvent,
    pub input: Value,
    /// Executor output, present for `*:after` events
    pub output: Option<Value>,
    /// Failure message, present for `*:error` events
    pub error: Option<String>,
    pub metadata: Map<String, Value>,
    pub aborted: bool,
    pub scope: Option<Scope>,
}

impl HookContext {
    pub fn new(event: HookEvent, input: Value) -> Self {
        Self {
            event,
            input,
            output: None,
            error: None,
            metadata: Map::new(),
            aborted: false,
            scope: None,
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Result from a single hook handler
#[derive(Debug, Clone, Default)]
pub struct HookResult {
    /// Replaces the input seen by later hooks
    pub transformed_input: Option<Value>,
    /// Replaces the invocation output (last writer wins)
    pub transformed_output: Option<Value>,
    /// Entries merged into the context metadata
    pub metadata: Map<String, Value>,
    /// Stop the remaining chain
    pub abort: bool,
}

impl HookResult {
    pub fn pass() -> Self {
        Self::default()
    }

    pub fn input(value: Value) -> Self {
        Self {
            transformed_input: Some(value),
            ..Self::default()
        }
    }

    pub fn output(value: Value) -> Self {
        Self {
            transformed_output: Some(value),
            ..Self::default()
        }
    }

    pub fn abort() -> Self {
        Self {
            abort: true,
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
