//! Exponential backoff with jitter
//!
//! | Attempt failed | Sleep before next attempt                 |
//! |----------------|-------------------------------------------|
//! | 1              | initial × factor⁰ (± 20 % jitter)         |
//! | 2              | initial × factor¹ (± 20 % jitter)         |
//! | n              | min(initial × factorⁿ⁻¹, max) (± 20 %)    |
//!
//! No delay follows the final attempt.

use crate::config::RetryConfig;
use rand::Rng;
use std::time::Duration;

/// Fraction of the computed delay used as the jitter amplitude
const JITTER_RATIO: f64 = 0.2;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_factor: config.backoff_factor,
            jitter: config.jitter,
        }
    }

    /// Backoff before the attempt following failed attempt `attempt` (1-based), without jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());

        if capped.is_finite() && capped > 0.0 {
            Duration::from_secs_f64(capped)
        } else if capped.is_finite() {
            Duration::ZERO
        } else {
            self.max_delay
        }
    }

    /// Backoff after failed attempt `attempt`, with jitter when enabled
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if !self.jitter || base.is_zero() {
            return base;
        }

        let amplitude = base.as_secs_f64() * JITTER_RATIO;
        let offset = rand::rng().random_range(-amplitude..=amplitude);
        Duration::from_secs_f64((base.as_secs_f64() + offset).max(0.0))
    }

    /// The delays a target sees if every attempt fails
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts).map(|n| self.delay(n)).collect()
    }

    /// Whether another attempt follows failed attempt `attempt`
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
