//! Retry policy for the consumer group read loop.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the reader reacts to consecutive read failures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay after the first failure in milliseconds; 0 retries immediately
    pub initial_backoff_ms: u64,
    /// Upper bound on any single delay in milliseconds
    pub max_backoff_ms: u64,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Give up after this many failures in a row; `None` retries forever
    pub max_consecutive_failures: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 100,
            max_backoff_ms: 30_000,
            multiplier: 2.0,
            max_consecutive_failures: None,
        }
    }
}

impl RetryPolicy {
    /// Retry at once, forever.
    pub fn immediate() -> Self {
        Self {
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            multiplier: 1.0,
            max_consecutive_failures: None,
        }
    }

    /// Stop after `limit` consecutive failures.
    pub fn with_max_failures(mut self, limit: u32) -> Self {
        self.max_consecutive_failures = Some(limit);
        self
    }

    /// Backoff before retry number `attempt` (0-based).
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let backoff = (self.initial_backoff_ms as f64) * self.multiplier.powi(exponent);
        let capped = backoff.min(self.max_backoff_ms as f64);
        Duration::from_millis(capped as u64)
    }

    /// Delay to wait after `failures` consecutive failures, or `None` to give up.
    pub fn next_delay(&self, failures: u32) -> Option<Duration> {
        match self.max_consecutive_failures {
            Some(limit) if failures >= limit => None,
            _ => Some(self.backoff_duration(failures.saturating_sub(1))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_duration(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_duration(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_duration(3), Duration::from_millis(800));
        assert_eq!(policy.backoff_duration(20), Duration::from_millis(30_000));
        assert_eq!(policy.backoff_duration(u32::MAX), Duration::from_millis(30_000));
    }

    #[test]
    fn test_immediate_never_waits() {
        let policy = RetryPolicy::immediate();
        assert_eq!(policy.next_delay(1), Some(Duration::ZERO));
        assert_eq!(policy.next_delay(10_000), Some(Duration::ZERO));
        assert_eq!(policy.next_delay(u32::MAX), Some(Duration::ZERO));
    }

    #[test]
    fn test_gives_up_at_limit() {
        let policy = RetryPolicy::immediate().with_max_failures(3);
        assert!(policy.next_delay(2).is_some());
        assert!(policy.next_delay(3).is_none());
    }
}
