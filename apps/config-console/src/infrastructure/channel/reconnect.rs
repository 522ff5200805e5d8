//! Reconnect Backoff
//!
//! Exponential backoff with jitter for the pipeline channel. The console
//! retries indefinitely: a dashboard that gives up on its data source is
//! worse than one that keeps knocking, and the next successful connection
//! resets the schedule.

use std::time::Duration;

use rand::Rng;

/// Backoff schedule configuration.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Ceiling for the growing delay.
    pub max_delay: Duration,
    /// Growth factor applied after each retry.
    pub multiplier: f64,
    /// Randomization as a fraction of the delay (0.1 = ±10%).
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

/// Stateful backoff schedule.
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    /// Create a schedule from a configuration.
    #[must_use]
    pub const fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Number of retries taken since the last reset.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Advance the schedule and return the delay to sleep before retrying.
    pub fn next_delay(&mut self) -> Duration {
        let exponent = self.attempt.min(31);
        self.attempt = self.attempt.saturating_add(1);

        let base = self.config.initial_delay.as_secs_f64() * self.config.multiplier.powi(
            i32::try_from(exponent).unwrap_or(i32::MAX),
        );
        let capped = base.min(self.config.max_delay.as_secs_f64());

        Duration::from_secs_f64(self.jittered(capped))
    }

    /// Reset after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt = 0;
    }

    fn jittered(&self, secs: f64) -> f64 {
        if self.config.jitter <= 0.0 {
            return secs;
        }
        let spread = secs * self.config.jitter;
        let offset: f64 = rand::rng().random_range(-spread..=spread);
        (secs + offset).max(0.001)
    }
}

// =============================================================================
// Tests
// =============================================================================
