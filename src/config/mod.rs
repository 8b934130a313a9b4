use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::monitoring::{LogLevel, TelemetryConfig};
use crate::storage::{RetryPolicy, HISTORY_CAPACITY};

/// Settings file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "spectral";

/// Prefix for environment overrides, e.g. `SPECTRAL__SERVER__PORT=8080`.
pub const ENV_PREFIX: &str = "SPECTRAL";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub log_level: LogLevel,
    pub server: ServerConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory served for any GET that is not an API route
    pub static_dir: PathBuf,
    pub enable_cors: bool,
    pub max_body_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub data_dir: PathBuf,
    pub file_name: String,
    pub capacity: usize,
    pub retry: RetryPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            static_dir: PathBuf::from("public"),
            enable_cors: true,
            max_body_bytes: 64 * 1024,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            file_name: "history.json".to_string(),
            capacity: HISTORY_CAPACITY,
            retry: RetryPolicy::default(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            server: ServerConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

impl Settings {
    /// Defaults, then `spectral.{toml,json,yaml}` if present, then
    /// `SPECTRAL__*` environment variables.
    pub fn new() -> Result<Self> {
        Self::layered(config::File::with_name(DEFAULT_CONFIG_FILE).required(false))
    }

    /// Same layering, but with an explicit settings file that must exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Configuration file not found: {}", path.display());
        }
        Self::layered(config::File::from(path))
    }

    fn layered<S>(file: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let defaults = config::Config::try_from(&Settings::default())
            .context("Failed to build default configuration")?;

        let settings = config::Config::builder()
            .add_source(defaults)
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration")?
            .try_deserialize::<Settings>()
            .context("Invalid configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.history.capacity == 0 {
            anyhow::bail!("history.capacity must be at least 1");
        }
        if self.history.file_name.trim().is_empty() {
            anyhow::bail!("history.file_name must not be empty");
        }
        Ok(())
    }

    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            log_level: self.log_level,
            ..TelemetryConfig::default()
        }
    }

    /// Effective settings rendered as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}
