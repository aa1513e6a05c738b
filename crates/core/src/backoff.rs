//! Exponential backoff for retryable intent failures.
//!
//! The delay before a failed intent becomes claimable again grows with its
//! attempt count, clamped to a ceiling, so a persistently failing external
//! dependency is not hot-looped.

use std::time::Duration;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay applied after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows with each further attempt.
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Delay to apply after the given failed attempt (1-based).
    ///
    /// Attempt 1 waits `initial_delay`, attempt 2 waits
    /// `initial_delay * multiplier`, and so on, clamped to `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let factor = self.multiplier.powi(exponent as i32);
        let delay_ms = (self.initial_delay.as_millis() as f64 * factor) as u64;
        Duration::from_millis(delay_ms).min(self.max_delay)
    }
}
