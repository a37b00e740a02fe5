//! AppRun Configuration Module
//!
//! Engine endpoint, poll backoff, bookkeeping store and provider records.
//! Config is stored in `~/.config/apprun/config.toml`.
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. Environment variables (`APPRUN_ENGINE_URL`, `APPRUN_STORE_PATH`)
//! 2. Config file (`~/.config/apprun/config.toml` or `--config`)
//! 3. Defaults

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::credentials::{mask_secret, ProviderRecord};
use crate::error::{AppRunError, Result};
use crate::runtime::PollConfig;
use crate::util::{
    CONNECT_TIMEOUT, DEFAULT_ENGINE_URL, ENGINE_TIMEOUT, POLL_CEILING, POLL_INCREMENT,
    POLL_INTERVAL, POLL_MAX_ATTEMPTS,
};

/// Env var overriding `engine.url`
pub const ENGINE_URL_ENV: &str = "APPRUN_ENGINE_URL";
/// Env var overriding `store.path`
pub const STORE_PATH_ENV: &str = "APPRUN_STORE_PATH";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppRunConfig {
    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub poll: PollSection,

    #[serde(default)]
    pub store: StoreSection,

    /// Provider records credentials are resolved from
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<ProviderRecord>,
}

/// Execution engine endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSection {
    pub url: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            url: DEFAULT_ENGINE_URL.to_string(),
            timeout_secs: ENGINE_TIMEOUT.as_secs(),
            connect_timeout_secs: CONNECT_TIMEOUT.as_secs(),
        }
    }
}

impl EngineSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Blocking-mode backoff, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollSection {
    pub interval_ms: u64,
    pub increment_ms: u64,
    pub ceiling_ms: u64,
    pub max_attempts: u32,
}

impl Default for PollSection {
    fn default() -> Self {
        Self {
            interval_ms: POLL_INTERVAL.as_millis() as u64,
            increment_ms: POLL_INCREMENT.as_millis() as u64,
            ceiling_ms: POLL_CEILING.as_millis() as u64,
            max_attempts: POLL_MAX_ATTEMPTS,
        }
    }
}

/// Bookkeeping store location
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreSection {
    /// Defaults to `<data_dir>/apprun/runs.ndjson`
    pub path: Option<PathBuf>,
}

impl AppRunConfig {
    /// Get the config directory path
    ///
    /// Returns `~/.config/apprun/` on Unix, `%APPDATA%/apprun/` on Windows
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("apprun")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`
    ///
    /// Returns default config if file doesn't exist.
    /// Returns error if file exists but is malformed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| AppRunError::Config {
            reason: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        toml::from_str(&content).map_err(|e| AppRunError::Config {
            reason: format!("Failed to parse config file {}: {}", path.display(), e),
        })
    }

    /// Merge with environment variables
    ///
    /// Environment variables take precedence over config file values.
    pub fn with_env(mut self) -> Self {
        if let Ok(url) = std::env::var(ENGINE_URL_ENV) {
            if !url.is_empty() {
                self.engine.url = url;
            }
        }

        if let Ok(path) = std::env::var(STORE_PATH_ENV) {
            if !path.is_empty() {
                self.store.path = Some(PathBuf::from(path));
            }
        }

        self
    }

    /// Check the engine URL and poll parameters
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.engine.url).map_err(|e| AppRunError::Config {
            reason: format!("Invalid engine url '{}': {}", self.engine.url, e),
        })?;
        self.poll_config().map(|_| ())
    }

    /// Backoff parameters from `[poll]`
    pub fn poll_config(&self) -> Result<PollConfig> {
        let config = PollConfig {
            interval: Duration::from_millis(self.poll.interval_ms),
            increment: Duration::from_millis(self.poll.increment_ms),
            ceiling: Duration::from_millis(self.poll.ceiling_ms),
            max_attempts: self.poll.max_attempts,
        };
        config
            .validate()
            .map_err(|reason| AppRunError::Config {
                reason: format!("Invalid [poll] section: {reason}"),
            })?;
        Ok(config)
    }

    /// Effective bookkeeping file
    pub fn store_path(&self) -> PathBuf {
        self.store.path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("apprun")
                .join("runs.ndjson")
        })
    }

    /// Copy safe to print: every string in provider configs is masked
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        for provider in &mut config.providers {
            mask_strings(&mut provider.config);
        }
        config
    }

    /// Serialize as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| AppRunError::Config {
            reason: format!("Failed to serialize config: {}", e),
        })
    }
}

fn mask_strings(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::String(s) => *s = mask_secret(s),
        serde_json::Value::Object(map) => map.values_mut().for_each(mask_strings),
        serde_json::Value::Array(items) => items.iter_mut().for_each(mask_strings),
        _ => {}
    }
}
