//! Retry policy: decides whether a failed task is reclaimed and how long it
//! backs off before it may be assigned again.

use serde::{Deserialize, Serialize};

/// Retry policy for tasks whose target was invalidated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Default `max_retries` for new tasks.
    pub max_retries: u32,

    /// Backoff before the first retry, in ticks.
    pub base_delay_ticks: u64,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound on the backoff.
    pub max_delay_ticks: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ticks: 5,
            multiplier: 2.0,
            max_delay_ticks: 100,
        }
    }
}

impl RetryPolicy {
    /// Backoff for the next attempt.
    ///
    /// `retry` is the retry number about to start (1-indexed):
    /// delay = base_delay * multiplier^(retry - 1), capped at `max_delay_ticks`.
    ///
    /// Example with base=5, multiplier=2.0: retry 1 → 5, retry 2 → 10, retry 3 → 20.
    pub fn next_delay(&self, retry: u32) -> u64 {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let delay = self.base_delay_ticks as f64 * self.multiplier.powi(exponent);
        if !delay.is_finite() || delay >= self.max_delay_ticks as f64 {
            return self.max_delay_ticks;
        }
        delay.round() as u64
    }

    /// Whether another retry is allowed after `retry_count` retries already spent.
    pub fn allows(retry_count: u32, max_retries: u32) -> bool {
        retry_count < max_retries
    }
}
