use std::time::Duration;

use serde::Deserialize;

/// Exponential backoff policy for reopening a lost channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Consecutive failed attempts tolerated before giving up.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_backoff_ms: u64,
    /// Ceiling on any single delay.
    pub max_backoff_ms: u64,
    /// Growth factor between attempts.
    pub multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff_ms: 250,
            max_backoff_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: initial_backoff.as_millis() as u64,
            ..Self::default()
        }
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff_ms = max_backoff.as_millis() as u64;
        self
    }

    /// Delay before retrying after failed attempt `attempt` (0-indexed).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let millis = self.initial_backoff_ms as f64 * self.multiplier.powi(exponent);
        Duration::from_millis(millis.min(self.max_backoff_ms as f64) as u64)
    }

    /// Should we retry after failed attempt `attempt` (0-indexed)?
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt.saturating_add(1) < self.max_attempts
    }
}
