//! Randomized inter-request pacing
//!
//! Delays are drawn from a normal distribution centred on the base delay,
//! with a standard deviation of a quarter of the allowed range, and clamped
//! to that range.

use crate::config::PacingConfig;
use rand_distr::{Distribution, Normal};
use std::time::Duration;

/// Gaussian delay applied before each crawl attempt
#[derive(Debug, Clone, Copy)]
pub struct PacingPolicy {
    min_delay: Duration,
    max_delay: Duration,
    base_delay: Duration,
}

impl PacingPolicy {
    pub fn new(min_delay: Duration, max_delay: Duration, base_delay: Duration) -> Self {
        let (min_delay, max_delay) = if min_delay <= max_delay {
            (min_delay, max_delay)
        } else {
            (max_delay, min_delay)
        };

        Self {
            min_delay,
            max_delay,
            base_delay: base_delay.clamp(min_delay, max_delay),
        }
    }

    pub fn from_config(config: &PacingConfig) -> Self {
        Self::new(
            Duration::from_millis(config.min_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            Duration::from_millis(config.base_delay_ms),
        )
    }

    /// A policy that never sleeps
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, Duration::ZERO)
    }

    /// Draws one delay without sleeping
    pub fn sample(&self) -> Duration {
        let min = self.min_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64();
        let std_dev = (max - min) / 4.0;

        let drawn = match Normal::new(self.base_delay.as_secs_f64(), std_dev) {
            Ok(normal) if std_dev > 0.0 => normal.sample(&mut rand::rng()),
            _ => self.base_delay.as_secs_f64(),
        };

        Duration::from_secs_f64(drawn.clamp(min, max))
    }

    /// Sleeps for one sampled delay and returns it
    pub async fn wait(&self) -> Duration {
        let delay = self.sample();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        delay
    }
}
