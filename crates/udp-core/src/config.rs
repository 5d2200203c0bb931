use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing and strictness parameters for a check cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Upper bound on a single receive wait (default: 10s).
    pub timeout: Duration,
    /// Retries after the first attempt, so a stream gets `retry_attempts + 1` probes.
    pub retry_attempts: u32,
    /// Fixed pause between two attempts on the same stream.
    pub retry_delay: Duration,
    /// When false, a successful bind/join counts as UP without waiting for traffic.
    pub require_data: bool,
    /// Maximum number of streams probed at the same time.
    pub max_concurrent_checks: usize,
    /// Period of the scheduler loop.
    pub check_interval: Duration,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry_attempts: 2,
            retry_delay: Duration::from_secs(2),
            require_data: true,
            max_concurrent_checks: 8,
            check_interval: Duration::from_secs(10),
        }
    }
}

impl CheckConfig {
    pub fn with_timeout(mut self, ms: u64) -> Self {
        self.timeout = Duration::from_millis(ms);
        self
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    pub fn with_retry_delay(mut self, ms: u64) -> Self {
        self.retry_delay = Duration::from_millis(ms);
        self
    }

    pub fn with_require_data(mut self, require: bool) -> Self {
        self.require_data = require;
        self
    }

    pub fn with_max_concurrent_checks(mut self, max: usize) -> Self {
        self.max_concurrent_checks = max.max(1);
        self
    }

    pub fn with_check_interval(mut self, ms: u64) -> Self {
        self.check_interval = Duration::from_millis(ms);
        self
    }

    /// Total number of probe attempts a stream may receive in one cycle.
    pub fn max_attempts(&self) -> u32 {
        self.retry_attempts.saturating_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_production_alerting() {
        let c = CheckConfig::default();
        assert_eq!(c.timeout, Duration::from_secs(10));
        assert_eq!(c.retry_attempts, 2);
        assert_eq!(c.max_attempts(), 3);
        assert!(c.require_data);
    }

    #[test]
    fn concurrency_is_at_least_one() {
        let c = CheckConfig::default().with_max_concurrent_checks(0);
        assert_eq!(c.max_concurrent_checks, 1);
    }

    #[test]
    fn builder_sets_millisecond_durations() {
        let c = CheckConfig::default()
            .with_timeout(250)
            .with_retry_delay(50)
            .with_check_interval(30_000);
        assert_eq!(c.timeout, Duration::from_millis(250));
        assert_eq!(c.retry_delay, Duration::from_millis(50));
        assert_eq!(c.check_interval, Duration::from_secs(30));
    }
}
