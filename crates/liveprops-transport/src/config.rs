//! Connection configuration
//!
//! Hosts usually ship connection settings alongside the rest of their app
//! config. [`ConnectionConfig`] is the serde/TOML form; it validates and turns
//! into [`ConnectionOptions`] once the params source is known.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionOptions;
use crate::error::ConfigError;
use crate::params::ParamsSource;
use crate::reconnect::ReconnectPolicy;

/// Reconnect schedule in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay for attempts `1..=schedule_ms.len()`
    pub schedule_ms: Vec<u64>,
    /// Delay for every later attempt
    pub fallback_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            schedule_ms: vec![10, 50, 100, 150, 200, 250, 500, 1000, 2000],
            fallback_ms: 5000,
        }
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        ReconnectPolicy::schedule_ms(&config.schedule_ms, config.fallback_ms)
    }
}

/// Serializable connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Socket endpoint path or URL
    pub endpoint: String,
    /// Interval between heartbeats
    pub heartbeat_interval_ms: u64,
    /// Push/join reply timeout
    pub timeout_ms: u64,
    /// Reconnect schedule
    pub reconnect: ReconnectConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: "/socket".to_string(),
            heartbeat_interval_ms: 30_000,
            timeout_ms: 10_000,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ConnectionConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::invalid("endpoint", "must not be empty"));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "heartbeat_interval_ms",
                "must be greater than 0",
            ));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::invalid("timeout_ms", "must be greater than 0"));
        }
        if self.reconnect.fallback_ms == 0 {
            return Err(ConfigError::invalid(
                "reconnect.fallback_ms",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Build connection options around `params`
    pub fn to_options(&self, params: ParamsSource) -> Result<ConnectionOptions, ConfigError> {
        self.validate()?;
        Ok(ConnectionOptions {
            params,
            logger: None,
            reconnect: ReconnectPolicy::from(&self.reconnect),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            timeout: Duration::from_millis(self.timeout_ms),
        })
    }
}
