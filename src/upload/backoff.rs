//! Exponential backoff between publish retries.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KeypoolError, Result};

/// Delay schedule: `initial * multiplier^(attempt - 1)`, capped at `max`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// First retry delay (default: 30s).
    pub initial_delay_ms: u64,
    /// Ceiling for any delay (default: 1h).
    pub max_delay_ms: u64,
    /// Growth factor per attempt (default: 2).
    pub multiplier: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 30_000,
            max_delay_ms: 60 * 60 * 1000,
            multiplier: 2,
        }
    }
}

impl BackoffPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.initial_delay_ms == 0 {
            return Err(KeypoolError::InvalidConfig(
                "backoff.initial_delay_ms must be positive".to_string(),
            ));
        }
        if self.multiplier == 0 {
            return Err(KeypoolError::InvalidConfig(
                "backoff.multiplier must be at least 1".to_string(),
            ));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(KeypoolError::InvalidConfig(
                "backoff.max_delay_ms must be >= initial_delay_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay for a 1-based attempt number.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = (self.multiplier as u64).saturating_pow(exponent);
        let millis = self
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(millis)
    }
}

/// Consecutive failures since the last success.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackoffState {
    attempts: u32,
}

impl BackoffState {
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record a failure and return (attempt, delay) for the retry.
    pub fn advance(&mut self, policy: &BackoffPolicy) -> (u32, Duration) {
        self.attempts = self.attempts.saturating_add(1);
        (self.attempts, policy.delay_for(self.attempts))
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
