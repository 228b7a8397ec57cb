//! Control-plane configuration, loaded from TOML.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::budget::BudgetSpec;
use crate::hooks::ExecuteOptions;
use crate::rate_limit::RateLimitPolicy;
use crate::scope::Scope;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ControlPlaneConfig {
    #[serde(default)]
    pub hooks: HooksConfig,

    #[serde(default)]
    pub invocation: InvocationConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub rate_limits: Vec<RateLimitEntry>,

    #[serde(default)]
    pub budgets: Vec<BudgetSpec>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HooksConfig {
    /// Per-hook timeout unless the hook overrides it
    #[serde(default = "default_hook_timeout_ms")]
    pub default_timeout_ms: u64,

    #[serde(default)]
    pub stop_on_error: bool,

    #[serde(default)]
    pub collect_results: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InvocationConfig {
    /// Executor deadline; 0 disables it
    #[serde(default = "default_invocation_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitEntry {
    pub scope: Scope,
    pub max_calls_per_minute: u32,
    pub max_calls_per_hour: u32,
    #[serde(default)]
    pub burst_allowance: u32,
}

fn default_hook_timeout_ms() -> u64 {
    500
}

fn default_invocation_timeout() -> u64 {
    300
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_hook_timeout_ms(),
            stop_on_error: false,
            collect_results: false,
        }
    }
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_invocation_timeout(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl HooksConfig {
    pub fn execute_options(&self) -> ExecuteOptions {
        ExecuteOptions {
            timeout: Duration::from_millis(self.default_timeout_ms),
            stop_on_error: self.stop_on_error,
            collect_results: self.collect_results,
        }
    }
}

impl InvocationConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl RateLimitEntry {
    pub fn policy(&self) -> RateLimitPolicy {
        RateLimitPolicy::new(self.max_calls_per_minute, self.max_calls_per_hour)
            .with_burst(self.burst_allowance)
    }
}

impl ControlPlaneConfig {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {:?}", path))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{BudgetPeriod, BudgetType};

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ControlPlaneConfig::from_toml_str("").unwrap();
        assert_eq!(config.hooks.default_timeout_ms, 500);
        assert_eq!(config.invocation.timeout(), Some(Duration::from_secs(300)));
        assert_eq!(config.telemetry.channel_capacity, 256);
        assert!(config.budgets.is_empty());
    }

    #[test]
    fn test_full_config_parses() {
        let config = ControlPlaneConfig::from_toml_str(
            r#"
            [hooks]
            default_timeout_ms = 250
            stop_on_error = true

            [invocation]
            timeout_secs = 0

            [[rate_limits]]
            scope = "agent:coder"
            max_calls_per_minute = 10
            max_calls_per_hour = 100
            burst_allowance = 5

            [[budgets]]
            scope = "global"
            type = "cost"
            limit = 25.5
            period = "month"
            enforce_limit = false
            "#,
        )
        .unwrap();

        let options = config.hooks.execute_options();
        assert_eq!(options.timeout, Duration::from_millis(250));
        assert!(options.stop_on_error);
        assert!(config.invocation.timeout().is_none());

        let policy = config.rate_limits[0].policy();
        assert_eq!(policy.minute_ceiling(), 15);

        let budget = &config.budgets[0];
        assert_eq!(budget.scope, Scope::Global);
        assert_eq!(budget.budget_type, BudgetType::Cost);
        assert_eq!(budget.period, BudgetPeriod::Month);
        assert!(!budget.enforce_limit);
    }

    #[test]
    fn test_invalid_scope_rejected() {
        let err = ControlPlaneConfig::from_toml_str(
            r#"
            [[rate_limits]]
            scope = "team:x"
            max_calls_per_minute = 1
            max_calls_per_hour = 1
            "#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control.toml");
        std::fs::write(&path, "[telemetry]\nchannel_capacity = 8\n").unwrap();
        let config = ControlPlaneConfig::load(&path).unwrap();
        assert_eq!(config.telemetry.channel_capacity, 8);

        assert!(ControlPlaneConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
