//! Configuration for the subscription layer.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::subscription::ReconnectPolicy;

/// Tunables for [`SubscriptionManager`](crate::SubscriptionManager).
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use view_sync::SyncConfig;
///
/// let config = SyncConfig::from_json(r#"{ "reconnect": { "max_attempts": 3 } }"#).unwrap();
/// assert_eq!(config.reconnect.max_attempts, 3);
/// assert_eq!(config.poll_interval_ms, 50);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// How long a dispatcher waits on its channel before re-checking for
    /// cancellation.
    pub poll_interval_ms: u64,
    /// Reconnect behaviour after a lost connection.
    pub reconnect: ReconnectPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl SyncConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be positive".into()));
        }
        if self.reconnect.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "reconnect.max_attempts must be at least 1".into(),
            ));
        }
        if !(self.reconnect.multiplier >= 1.0) {
            return Err(ConfigError::Invalid(
                "reconnect.multiplier must be at least 1.0".into(),
            ));
        }
        if self.reconnect.max_backoff_ms < self.reconnect.initial_backoff_ms {
            return Err(ConfigError::Invalid(
                "reconnect.max_backoff_ms must not be below initial_backoff_ms".into(),
            ));
        }
        Ok(())
    }
}

/// Error loading a [`SyncConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Parse(String),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Parse(msg) => write!(f, "config parse error: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
