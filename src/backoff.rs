use std::time::Duration;

use rand::{rng, RngExt};
use tokio::time::Instant;

use crate::CoordinatorConfig;

/// Exponential reconnect backoff with symmetric jitter.
///
/// `delay = clamp(min(min_delay * 2^attempt, max_delay) * (1 + jitter * u), 0, max_delay)`
/// with `u` drawn uniformly from `[-1, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub jitter: f64,
}

impl From<&CoordinatorConfig> for RetryPolicy {
    fn from(config: &CoordinatorConfig) -> Self {
        Self {
            min_delay: config.min_retry_delay,
            max_delay: config.max_retry_delay,
            jitter: config.retry_jitter,
        }
    }
}

impl RetryPolicy {
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = (self.min_delay.as_secs_f64() * 2.0_f64.powi(exp))
            .min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(delay)
    }

    /// Delay for `attempt` with `unit` in `[-1, 1]` selecting the jitter offset.
    pub fn delay_with_jitter(&self, attempt: u32, unit: f64) -> Duration {
        let nominal = self.nominal_delay(attempt).as_secs_f64();
        let offset = nominal * self.jitter * unit.clamp(-1.0, 1.0);
        Duration::from_secs_f64((nominal + offset).clamp(0.0, self.max_delay.as_secs_f64()))
    }

    pub fn random_delay(&self, attempt: u32) -> Duration {
        let unit: f64 = rng().random_range(-1.0..=1.0);
        self.delay_with_jitter(attempt, unit)
    }
}

/// Attempt counter and notification throttle of the reconnection supervisor.
#[derive(Debug, Default)]
pub struct RetryState {
    attempts: u32,
    last_notification: Option<Instant>,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Counts a new attempt and returns its number (starting at 1).
    pub fn next_attempt(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.last_notification = None;
    }

    /// True at most once per `interval`, and only after `threshold` attempts.
    pub fn should_notify(&mut self, now: Instant, threshold: u32, interval: Duration) -> bool {
        if self.attempts < threshold {
            return false;
        }
        match self.last_notification {
            Some(last) if now.saturating_duration_since(last) <= interval => false,
            _ => {
                self.last_notification = Some(now);
                true
            }
        }
    }
}
