use anyhow::Result;
use operon_control::{ControlPlaneConfig, Scope};
use serde_json::json;

use super::build_plane;

pub fn execute(scope: Option<&str>, config: &ControlPlaneConfig) -> Result<()> {
    let plane = build_plane(config)?;
    let scope: Option<Scope> = scope.map(str::parse).transpose()?;

    let budgets: Vec<_> = plane
        .budgets
        .list(scope.as_ref())
        .iter()
        .map(|b| b.status())
        .collect();
    let rate_limits: Vec<_> = plane
        .rate_limiter
        .policies()
        .into_iter()
        .filter(|(s, _)| scope.as_ref().map_or(true, |wanted| wanted == s))
        .map(|(scope, policy)| json!({ "scope": scope, "policy": policy }))
        .collect();

    let report = json!({
        "budgets": budgets,
        "rate_limits": rate_limits,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
