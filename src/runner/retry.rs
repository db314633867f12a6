//! Exponential backoff for failed reconciliation runs.
//!
//! Transient failures never exhaust: a task is retried until it succeeds or an
//! operator removes it. Only the spacing between attempts grows.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Configuration for exponential backoff between task attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Delay after the first failure.
    pub initial_delay: Duration,

    /// Cap for exponential growth.
    pub max_delay: Duration,

    /// Growth factor per failed attempt (typically 2.0).
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// 1s, 2s, 4s, ... capped at 5 minutes.
    pub const DEFAULT: Self = Self {
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(300),
        backoff_multiplier: 2.0,
    };

    pub fn new(initial_delay: Duration, max_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Delay after a task has already failed `attempt` times (0-indexed).
    ///
    /// `min(initial_delay * backoff_multiplier^attempt, max_delay)`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped_secs.max(0.0))
    }

    /// Earliest time a task that failed `attempt` times before `now` may rerun.
    pub fn next_attempt_at(&self, attempt: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        let delay = chrono::Duration::from_std(self.delay_for_attempt(attempt))
            .unwrap_or(chrono::Duration::MAX);
        now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
