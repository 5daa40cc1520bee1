//! Reconnection Policy
//!
//! Attempt-indexed linear backoff for the streaming connection: the delay
//! before attempt `n` is `base_delay × n`, capped at a configured maximum
//! attempt count. Exceeding the cap surfaces a terminal error to the caller.

use std::time::Duration;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Base unit of the linear backoff.
    pub base_delay: Duration,
    /// Maximum number of reconnection attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_attempts: 5,
        }
    }
}

/// Reconnection policy implementing attempt-indexed linear backoff.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Get the delay before the next attempt.
    ///
    /// Returns `None` if max attempts have been exceeded.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.config.max_attempts > 0 && self.attempt_count >= self.config.max_attempts {
            return None;
        }
        self.attempt_count += 1;
        Some(self.config.base_delay * self.attempt_count)
    }

    /// Reset the policy after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Get the current attempt count.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Check if reconnection should continue.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = ReconnectConfig::default();
        assert_eq!(config.base_delay, Duration::from_millis(1000));
        assert_eq!(config.max_attempts, 5);
    }

    #[test]
    fn policy_linear_backoff() {
        let config = ReconnectConfig {
            base_delay: Duration::from_millis(100),
            max_attempts: 0,
        };
        let mut policy = ReconnectPolicy::new(config);

        assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(300)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(400)));
    }

    #[test]
    fn policy_max_attempts() {
        let config = ReconnectConfig {
            base_delay: Duration::from_millis(100),
            max_attempts: 3,
        };
        let mut policy = ReconnectPolicy::new(config);

        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert_eq!(policy.attempt_count(), 3);

        // Fourth attempt exceeds the cap.
        assert!(policy.next_delay().is_none());
        assert!(!policy.should_retry());
    }

    #[test]
    fn policy_reset() {
        let config = ReconnectConfig {
            base_delay: Duration::from_millis(100),
            max_attempts: 3,
        };
        let mut policy = ReconnectPolicy::new(config);

        let _ = policy.next_delay();
        let _ = policy.next_delay();
        assert_eq!(policy.attempt_count(), 2);

        policy.reset();
        assert_eq!(policy.attempt_count(), 0);
        assert!(policy.should_retry());
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn unlimited_attempts() {
        let config = ReconnectConfig {
            base_delay: Duration::from_millis(1),
            max_attempts: 0,
        };
        let mut policy = ReconnectPolicy::new(config);

        for _ in 0..1000 {
            assert!(policy.should_retry());
            assert!(policy.next_delay().is_some());
        }
    }
}
