//! Runner configuration.
//!
//! # Environment
//!
//! | Variable | Default |
//! |----------|---------|
//! | `RECONCILER_WORKERS` | 4 |
//! | `RECONCILER_IDLE_POLL_MS` | 5000 |
//! | `RECONCILER_RETRY_INITIAL_MS` | 1000 |
//! | `RECONCILER_RETRY_MAX_MS` | 300000 |
//! | `RECONCILER_RETRY_MULTIPLIER` | 2.0 |
//!
//! Unparseable values fall back to the default.

use std::str::FromStr;
use std::time::Duration;

use super::retry::RetryConfig;

const DEFAULT_WORKERS: usize = 4;

const DEFAULT_IDLE_POLL_MS: u64 = 5_000;

/// Configuration for the reconciliation worker pool.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    /// Number of concurrent workers. Always at least one.
    pub workers: usize,

    /// How long an idle worker sleeps before checking the queue again when no
    /// enqueue wakes it. Also bounds how late a backed-off task is picked up.
    pub idle_poll_interval: Duration,

    pub retry: RetryConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        RunnerConfig {
            workers: DEFAULT_WORKERS,
            idle_poll_interval: Duration::from_millis(DEFAULT_IDLE_POLL_MS),
            retry: RetryConfig::DEFAULT,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_idle_poll_interval(mut self, interval: Duration) -> Self {
        self.idle_poll_interval = interval;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Reads the `RECONCILER_*` variables from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::new();
        let parse = |key: &str| lookup(key).and_then(|v| parse_value::<u64>(&v));

        let retry = RetryConfig {
            initial_delay: parse("RECONCILER_RETRY_INITIAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.initial_delay),
            max_delay: parse("RECONCILER_RETRY_MAX_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.max_delay),
            backoff_multiplier: lookup("RECONCILER_RETRY_MULTIPLIER")
                .and_then(|v| parse_value::<f64>(&v))
                .filter(|m| m.is_finite() && *m >= 1.0)
                .unwrap_or(defaults.retry.backoff_multiplier),
        };

        RunnerConfig {
            workers: lookup("RECONCILER_WORKERS")
                .and_then(|v| parse_value::<usize>(&v))
                .unwrap_or(defaults.workers)
                .max(1),
            idle_poll_interval: parse("RECONCILER_IDLE_POLL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.idle_poll_interval),
            retry,
        }
    }
}

fn parse_value<T: FromStr>(raw: &str) -> Option<T> {
    raw.trim().parse().ok()
}
