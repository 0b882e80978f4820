//! Configuration file handling for ferry.
//!
//! Adapters are declared in a TOML file at `~/.config/ferry/config.toml`
//! (or the path given with `--config`):
//!
//! ```toml
//! [lfs.customtransfer.s3]
//! path = "/usr/local/bin/lfs-s3-agent"
//! args = "--bucket media"
//! concurrent = true
//! direction = "both"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use ferry_core::{AdapterRegistry, ConfigMap, ConfigureReport, configure_custom_adapters};

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the ferry config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/ferry` or `~/.config/ferry`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("ferry");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("ferry")
}

/// Return the path to the default ferry config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Loading
// -----------------------------------------------------------------------

/// Load the config file into a flat key/value map.
///
/// An explicitly requested file must exist. A missing default file yields
/// an empty configuration.
pub fn load_config(explicit: Option<&Path>) -> Result<ConfigMap> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let path = config_path();
            if !path.exists() {
                debug!(path = %path.display(), "no config file, no adapters configured");
                return Ok(ConfigMap::new());
            }
            path
        }
    };

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    ConfigMap::from_toml_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))
}

/// Build the adapter registry from a loaded configuration.
pub fn build_registry(config: &ConfigMap, namespace: &str) -> (AdapterRegistry, ConfigureReport) {
    let mut registry = AdapterRegistry::new();
    let report = configure_custom_adapters(&mut registry, config, namespace);
    (registry, report)
}
