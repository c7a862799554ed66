use rand::Rng;
use std::time::Duration;

use crate::config::RetryConfig;

/// Exponential backoff with additive jitter:
/// `min(initial * factor^attempt, max) + U[0, jitter)`, attempt zero-based.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    initial_delay: f64,
    factor: f64,
    max_delay: f64,
    jitter: f64,
}

impl BackoffPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            initial_delay: config.initial_delay_secs,
            factor: config.backoff_factor,
            max_delay: config.max_delay_secs,
            jitter: config.jitter_secs,
        }
    }

    /// Capped delay before jitter, in seconds.
    pub fn base_secs(&self, attempt: u32) -> f64 {
        if self.initial_delay == 0.0 {
            return 0.0;
        }
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let raw = self.initial_delay * self.factor.powi(exponent);
        if raw.is_finite() {
            raw.min(self.max_delay)
        } else {
            self.max_delay
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, &mut rand::rng())
    }

    pub fn delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let jitter = if self.jitter > 0.0 {
            rng.random::<f64>() * self.jitter
        } else {
            0.0
        };
        secs_to_duration(self.base_secs(attempt) + jitter)
    }
}

/// Saturating conversion: NaN and negatives become zero, overflow becomes
/// `Duration::MAX`.
fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}
