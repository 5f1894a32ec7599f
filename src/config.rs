use crate::durable::retry::Backoff;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Engine settings, loaded from TOML. Every field has a default, so an empty
/// file is a valid configuration. Durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deployment name, embedded in polling schedule ids.
    pub stack: String,
    pub retry: RetryConfig,
    pub list_page_size: usize,
    /// Journal entries after which a paginated workflow continues as new.
    pub history_threshold: usize,
    pub default_polling_period_ms: u64,
    /// Attempts for a single status poll before the tick gives up.
    pub poll_status_attempts: u32,
    /// Attempts for best-effort cleanup such as trigger deletion.
    pub cleanup_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stack: "default".to_string(),
            retry: RetryConfig::default(),
            list_page_size: 100,
            history_threshold: 10_000,
            default_polling_period_ms: 120_000,
            poll_status_attempts: 3,
            cleanup_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub initial_interval_ms: u64,
    pub backoff_coefficient: f64,
    pub maximum_interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 1_000,
            backoff_coefficient: 2.0,
            maximum_interval_ms: 100_000,
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff {
            initial_interval: Duration::from_millis(self.initial_interval_ms),
            coefficient: self.backoff_coefficient,
            maximum_interval: Duration::from_millis(self.maximum_interval_ms),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn default_polling_period(&self) -> Duration {
        Duration::from_millis(self.default_polling_period_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.stack.trim().is_empty() {
            return Err(ConfigError::Invalid("stack must not be empty".into()));
        }
        if self.retry.backoff_coefficient < 1.0 {
            return Err(ConfigError::Invalid(
                "retry.backoff_coefficient must be at least 1".into(),
            ));
        }
        if self.default_polling_period_ms == 0 {
            return Err(ConfigError::Invalid(
                "default_polling_period_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}
