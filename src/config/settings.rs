//! Process configuration loading from a TOML file.
//!
//! The file names the store to connect to, the per-operation store timeout, whether
//! actions must be attributed to an authenticated user, and the category table.

use super::categories::CategoryConfig;
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::{path::Path, time::Duration};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_VAR: &str = "TOGGLES_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const DEFAULT_STORE_URL: &str = "sqlite://data/toggles.sqlite?mode=rwc";
const DEFAULT_TIMEOUT_MS: u64 = 2_000;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Attribute actions to the session user instead of `Anonymous`
    #[serde(default)]
    pub requires_auth: bool,
    /// Store connection settings
    #[serde(default)]
    pub store: StoreConfig,
    /// Multi-toggle categories; id 0 is reserved for simple toggles
    #[serde(default)]
    pub categories: Vec<CategoryConfig>,
}

/// Store connection settings
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Database URL; overridden by `DATABASE_URL`
    #[serde(default = "default_store_url")]
    pub url: String,
    /// Deadline for a single store operation, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_store_url() -> String {
    DEFAULT_STORE_URL.to_string()
}

const fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Loads the configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - The timeout is zero
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    tracing::debug!("Attempting to load configuration from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {path_ref:?}: {e}"),
    })?;

    let config: AppConfig = toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse TOML from config file {path_ref:?}: {e}"),
    })?;

    if config.store.timeout_ms == 0 {
        return Err(Error::Config {
            message: "store.timeout_ms must be greater than zero".to_string(),
        });
    }
    Ok(config)
}

/// Loads the configuration from `$TOGGLES_CONFIG`, falling back to ./config.toml
pub fn load_default_config() -> Result<AppConfig> {
    let path =
        std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load_config(path)
}
