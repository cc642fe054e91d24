//! Exponential backoff between ledger append attempts.
//!
//! - Default: 3 attempts in total, waiting 1s then 2s between them
//! - Delays double per attempt and are capped at 8s

use std::time::Duration;

/// Configuration for exponential backoff retry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one. Always at least 1.
    pub max_attempts: u32,

    /// Delay after the first failed attempt.
    pub initial_delay: Duration,

    /// Maximum delay between attempts (cap for exponential growth).
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (typically 2.0).
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Default configuration for appending to the shared ledger branch.
    pub const DEFAULT: Self = Self {
        max_attempts: 3,
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(8),
        backoff_multiplier: 2.0,
    };

    /// Creates a new retry configuration. `max_attempts` of 0 is treated as 1,
    /// and a multiplier below 1.0 (or not finite) as 1.0.
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
            backoff_multiplier: if backoff_multiplier.is_finite() {
                backoff_multiplier.max(1.0)
            } else {
                1.0
            },
        }
    }

    /// Same delays, different attempt budget.
    pub fn with_max_attempts(self, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..self
        }
    }

    /// Computes the delay after the given failed attempt (0-indexed).
    ///
    /// The delay grows exponentially: `initial_delay * backoff_multiplier^attempt`,
    /// capped at `max_delay`. A product that is not a valid duration (the
    /// fields are public, so the multiplier may be negative or NaN) yields
    /// `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped_secs).unwrap_or(self.max_delay)
    }

    /// Returns an iterator over every delay that can be slept between attempts.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_attempts.saturating_sub(1)).map(|attempt| self.delay_for_attempt(attempt))
    }

    /// Computes the total time spent sleeping when every attempt fails.
    pub fn total_max_wait(&self) -> Duration {
        self.delays().sum()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
