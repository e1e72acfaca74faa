//! Retry schedule for transport failures.
//!
//! Only failures where no response arrived are retried. The delay before
//! retry `n` (1-based) is `min(base * 2^n, cap)`. There is no jitter, so
//! many calls failing together will retry together.

use std::time::Duration;

use crate::config::ApiConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ApiConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ApiConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_ms),
            max_delay: Duration::from_millis(config.retry_cap_ms),
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// The full delay schedule for a call that never gets a response.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..=self.max_retries).map(|n| self.delay_for(n)).collect()
    }

    pub fn can_retry(&self, attempt: &RequestAttempt) -> bool {
        attempt.retry_count < self.max_retries
    }
}

/// Per-attempt record threaded through the retry loop.
///
/// A new record is produced for each attempt; the request itself is never
/// touched between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestAttempt {
    pub retry_count: u32,
}

impl RequestAttempt {
    pub fn first() -> Self {
        Self::default()
    }

    pub fn is_retry(&self) -> bool {
        self.retry_count > 0
    }

    #[must_use]
    pub fn next(self) -> Self {
        Self {
            retry_count: self.retry_count + 1,
        }
    }
}
