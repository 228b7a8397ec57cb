pub mod admit;
pub mod init;
pub mod simulate;
pub mod status;

use anyhow::Result;
use operon_control::{ControlPlane, ControlPlaneConfig, SystemClock};
use std::sync::Arc;

/// Build a control plane from config on the system clock
pub fn build_plane(config: &ControlPlaneConfig) -> Result<ControlPlane> {
    Ok(ControlPlane::from_config(config, Arc::new(SystemClock::new()))?)
}
