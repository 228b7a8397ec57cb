use anyhow::Result;
use operon_control::{AdmissionRequest, ControlPlaneConfig, Scope};

use super::build_plane;

pub fn execute(scope: &str, tokens: f64, cost: f64, config: &ControlPlaneConfig) -> Result<()> {
    let plane = build_plane(config)?;
    let scope: Scope = scope.parse()?;

    let decision = plane
        .admission
        .admit(&scope, AdmissionRequest::new(tokens, cost));
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}
