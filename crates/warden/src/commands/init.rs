use anyhow::Result;
use std::path::Path;

const DEFAULT_CONFIG: &str = r#"# Warden control plane configuration

[hooks]
# Per-hook timeout; a hook that does not settle in time has no effect
default_timeout_ms = 500
stop_on_error = false
collect_results = false

[invocation]
# Executor deadline, 0 disables it
timeout_secs = 300

[telemetry]
channel_capacity = 256

[[rate_limits]]
scope = "global"
max_calls_per_minute = 60
max_calls_per_hour = 1000
burst_allowance = 10

[[budgets]]
scope = "global"
type = "token"
limit = 1000000
period = "day"
alert_threshold = 0.8
enforce_limit = true

[[budgets]]
scope = "global"
type = "cost"
limit = 50.0
period = "month"
alert_threshold = 0.8
enforce_limit = false
"#;

/// Initialize a new config file
pub fn run_init(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("Config already exists at {:?}", path);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, DEFAULT_CONFIG)?;
    println!("Created config at {:?}", path);
    Ok(())
}
