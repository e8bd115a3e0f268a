//! Sub-command implementations.

pub mod batch;
pub mod check;
pub mod config;
pub mod extract;
pub mod infer;

use std::path::{Path, PathBuf};

use tracing::debug;

use isdoc_core::models::config::IsdocConfig;

/// Default location of the configuration file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("isdoc")
        .join("config.json")
}

/// The path given with `--config`, or the default location.
pub fn config_path(explicit: Option<&str>) -> PathBuf {
    explicit.map(PathBuf::from).unwrap_or_else(default_config_path)
}

/// Load the configuration. An explicit path must exist; a missing default
/// file means defaults.
pub fn load_config(explicit: Option<&str>) -> anyhow::Result<IsdocConfig> {
    if let Some(path) = explicit {
        return Ok(IsdocConfig::from_file(Path::new(path))?);
    }

    let path = default_config_path();
    if path.exists() {
        debug!("Loading configuration from {}", path.display());
        Ok(IsdocConfig::from_file(&path)?)
    } else {
        Ok(IsdocConfig::default())
    }
}

/// Configuration at `path`, or defaults when the file does not exist yet.
pub fn load_or_default(path: &Path) -> anyhow::Result<IsdocConfig> {
    if path.exists() {
        Ok(IsdocConfig::from_file(path)?)
    } else {
        Ok(IsdocConfig::default())
    }
}
