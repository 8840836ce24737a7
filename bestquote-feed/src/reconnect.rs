//! Backoff between stream reconnect attempts.

use crate::error::FeedError;
use std::time::Duration;

/// Reconnect backoff settings for a stream feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay.
    pub max_delay: Duration,
    /// Growth factor applied after each failed attempt.
    pub multiplier: f64,
    /// Consecutive failures tolerated before giving up; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    /// Returns the delay after `attempt` consecutive failures (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

/// Connection lifecycle of one stream feed.
///
/// Tracks consecutive failures and whether the feed has been interrupted
/// since its last successful connect, which decides if the store must be
/// reset once the connection is back.
#[derive(Debug)]
pub struct ReconnectState {
    config: ReconnectConfig,
    failures: u32,
    interrupted: bool,
    connects: u64,
}

impl ReconnectState {
    /// Creates state for a feed that has never connected.
    #[must_use]
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            failures: 0,
            interrupted: false,
            connects: 0,
        }
    }

    /// Records a connect failure or a dropped connection.
    ///
    /// # Errors
    /// Returns `FeedError::MaxReconnectAttempts` once the attempt limit is hit.
    pub fn on_failure(&mut self) -> Result<Duration, FeedError> {
        self.failures = self.failures.saturating_add(1);
        if self.connects > 0 {
            self.interrupted = true;
        }
        if let Some(max) = self.config.max_attempts
            && self.failures > max
        {
            return Err(FeedError::MaxReconnectAttempts);
        }
        Ok(self.config.delay_for(self.failures))
    }

    /// Records a successful connect.
    ///
    /// Returns true if an earlier connection was lost, i.e. this is a reconnect.
    pub fn on_connected(&mut self) -> bool {
        self.failures = 0;
        self.connects += 1;
        std::mem::take(&mut self.interrupted)
    }

    /// Returns consecutive failures since the last connect.
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Returns the number of successful connects.
    #[must_use]
    pub fn connects(&self) -> u64 {
        self.connects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_attempts: Option<u32>) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_attempts,
        }
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let config = config(None);
        assert_eq!(config.delay_for(1), Duration::from_millis(100));
        assert_eq!(config.delay_for(2), Duration::from_millis(200));
        assert_eq!(config.delay_for(3), Duration::from_millis(400));
        assert_eq!(config.delay_for(5), Duration::from_secs(1));
        assert_eq!(config.delay_for(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_attempt_limit() {
        let mut state = ReconnectState::new(config(Some(2)));
        assert!(state.on_failure().is_ok());
        assert!(state.on_failure().is_ok());
        assert!(matches!(
            state.on_failure(),
            Err(FeedError::MaxReconnectAttempts)
        ));
    }

    #[test]
    fn test_first_connect_is_not_a_reconnect() {
        let mut state = ReconnectState::new(config(None));
        state.on_failure().unwrap();
        assert!(!state.on_connected());
        assert_eq!(state.failures(), 0);

        state.on_failure().unwrap();
        state.on_failure().unwrap();
        assert!(state.on_connected());
        assert!(!state.on_connected());
        assert_eq!(state.connects(), 3);
    }

    #[test]
    fn test_connect_resets_backoff() {
        let mut state = ReconnectState::new(config(Some(1)));
        state.on_connected();
        assert_eq!(state.on_failure().unwrap(), Duration::from_millis(100));
        state.on_connected();
        assert_eq!(state.on_failure().unwrap(), Duration::from_millis(100));
    }
}
