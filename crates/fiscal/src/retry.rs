//! Retry policy for transient fiscal failures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    #[default]
    Fixed,
    /// Linear backoff: base * retry
    Linear,
    /// Exponential backoff: base * 2^(retry - 1)
    Exponential,
}

impl BackoffStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "fixed" | "flat" => Some(Self::Fixed),
            "linear" => Some(Self::Linear),
            "exponential" => Some(Self::Exponential),
            _ => None,
        }
    }
}

/// Retry policy configuration.
///
/// Delays are capped at `max_delay` and never decrease as `retry_count` grows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retry ceiling: a failure that brings `retry_count` to this value is terminal
    pub max_retries: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
    /// Backoff strategy
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(300),
            strategy: BackoffStrategy::Fixed,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Create a policy with fixed delays.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    /// Create a policy with exponential backoff.
    pub fn exponential(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// Delay before the next attempt, given the retry count *after* the failure
    /// was recorded (1-indexed).
    pub fn delay_for_retry(&self, retry_count: u32) -> Duration {
        if retry_count == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay.as_millis().min(u64::MAX as u128) as u64;
        let max_ms = self.max_delay.as_millis().min(u64::MAX as u128) as u64;

        let delay_ms = match self.strategy {
            BackoffStrategy::Fixed => base_ms,
            BackoffStrategy::Linear => base_ms.saturating_mul(retry_count as u64),
            BackoffStrategy::Exponential => {
                let shift = (retry_count - 1).min(63);
                base_ms.saturating_mul(1u64 << shift)
            }
        };

        Duration::from_millis(delay_ms.min(max_ms.max(base_ms)))
    }

    /// Check if another attempt is allowed after `retry_count` failures.
    pub fn should_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }
}
