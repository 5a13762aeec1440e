//! Retry policy: decides backoff delays.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Retry policy for failed jobs.
///
/// Exponential backoff: `delay = base_delay * multiplier^(attempts - 1)`,
/// capped at `max_delay`. Callers may bypass it with an explicit backoff on
/// `update_job_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay after the first failed attempt.
    pub base_delay_secs: u64,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for any computed delay.
    pub max_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_secs: 30,
            multiplier: 2.0,
            max_delay_secs: 3600,
        }
    }
}

impl RetryPolicy {
    /// Calculate the delay before the next attempt.
    ///
    /// `attempts` is the number of attempts already made (1-indexed); 0 is
    /// treated like 1. With base=30s, multiplier=2.0: 30s, 60s, 120s, ...
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exp = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = (self.base_delay_secs as f64) * 1000.0;
        let cap_ms = (self.max_delay_secs as f64) * 1000.0;
        let scaled = base_ms * self.multiplier.max(1.0).powi(exp);
        // powi overflows to +inf for large exponents; min() folds it into the cap.
        let delay_ms = scaled.min(cap_ms).max(0.0);
        Duration::milliseconds(delay_ms as i64)
    }
}
