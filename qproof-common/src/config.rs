//! Configuration loading and data directory resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// TOML configuration file contents
///
/// Stored at `~/.config/qproof/config.toml` (Linux) or the platform
/// equivalent. All fields optional; missing values fall back to environment
/// variables or compiled defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Data directory holding the SQLite database
    pub data_dir: Option<String>,

    /// Base URL for the verification-agent collaborator
    pub agent_url: Option<String>,

    /// Base URL for the pricing collaborator
    pub pricing_url: Option<String>,

    /// Verification-agent request timeout in milliseconds
    pub agent_timeout_ms: Option<u64>,

    /// Log level filter (e.g. "info", "debug")
    pub log_level: Option<String>,
}

/// Load the TOML configuration from the given path
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Write the TOML configuration to the given path
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Default configuration file path for the platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("qproof").join("config.toml"))
}

/// Resolve the data directory following the priority order:
/// 1. Environment variable (`QPROOF_DATA_DIR`)
/// 2. TOML config file (`data_dir`)
/// 3. OS-dependent compiled default
pub fn resolve_data_dir(toml_config: Option<&TomlConfig>) -> PathBuf {
    if let Ok(path) = std::env::var("QPROOF_DATA_DIR") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(config) = toml_config {
        if let Some(path) = &config.data_dir {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }
    }

    default_data_dir()
}

/// OS-dependent default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("qproof"))
        .unwrap_or_else(|| PathBuf::from("./qproof_data"))
}

/// Ensure the data directory exists, creating it if missing
pub fn ensure_data_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    Ok(())
}
