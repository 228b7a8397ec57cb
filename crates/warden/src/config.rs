use anyhow::Result;
use operon_control::ControlPlaneConfig;
use std::path::{Path, PathBuf};

/// Expand `~` in user-supplied paths
pub fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).to_string())
}

/// Load config from file or use defaults
pub fn load_config(path: Option<&Path>) -> Result<ControlPlaneConfig> {
    match path {
        Some(path) => ControlPlaneConfig::load(&expand_path(path)),
        None => Ok(ControlPlaneConfig::default()),
    }
}
