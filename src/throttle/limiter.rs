//! Sliding-window admission control
//!
//! Every outbound request passes through one shared [`AdmissionController`].
//! It keeps the instants of recent admissions and holds callers back until
//! issuing one more request would keep the trailing window within budget.

use crate::config::LimiterConfig;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Extra wait added after the oldest admission leaves the window
const SAFETY_MARGIN: Duration = Duration::from_millis(100);

/// Snapshot of the controller's state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterStats {
    /// Admissions currently inside the window
    pub in_window: usize,
    pub max_requests: usize,
    pub time_window: Duration,
    /// How long a caller arriving now would wait
    pub wait: Duration,
}

/// Shared sliding-window request gate
///
/// Cloning is cheap and every clone shares the same window.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    max_requests: usize,
    time_window: Duration,
    admitted: Arc<Mutex<VecDeque<Instant>>>,
}

impl AdmissionController {
    /// Creates a controller admitting `max_requests` per trailing `time_window`
    pub fn new(max_requests: usize, time_window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            time_window,
            admitted: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn from_config(config: &LimiterConfig) -> Self {
        Self::new(
            config.max_requests,
            Duration::from_secs(config.time_window_secs),
        )
    }

    /// Waits until one more request fits in the window, then records it
    ///
    /// Returns the total time spent waiting.
    pub async fn acquire(&self) -> Duration {
        let started = Instant::now();

        loop {
            let wait = {
                let mut admitted = self.lock();
                let now = Instant::now();
                self.prune(&mut admitted, now);

                if admitted.len() < self.max_requests {
                    admitted.push_back(now);
                    None
                } else {
                    Some(self.wait_for_oldest(&admitted, now))
                }
            };

            match wait {
                None => return started.elapsed(),
                Some(wait) => {
                    tracing::debug!(wait_ms = wait.as_millis() as u64, "Admission window full");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Reports how long `acquire` would wait right now, without admitting
    pub fn time_until_available(&self) -> Duration {
        let mut admitted = self.lock();
        let now = Instant::now();
        self.prune(&mut admitted, now);

        if admitted.len() < self.max_requests {
            Duration::ZERO
        } else {
            self.wait_for_oldest(&admitted, now)
        }
    }

    /// Returns the current window state
    pub fn stats(&self) -> LimiterStats {
        let mut admitted = self.lock();
        let now = Instant::now();
        self.prune(&mut admitted, now);

        let wait = if admitted.len() < self.max_requests {
            Duration::ZERO
        } else {
            self.wait_for_oldest(&admitted, now)
        };

        LimiterStats {
            in_window: admitted.len(),
            max_requests: self.max_requests,
            time_window: self.time_window,
            wait,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Instant>> {
        // The deque holds plain instants, so a poisoned lock is still consistent.
        self.admitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn prune(&self, admitted: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = admitted.front() {
            if now.duration_since(*oldest) >= self.time_window {
                admitted.pop_front();
            } else {
                break;
            }
        }
    }

    fn wait_for_oldest(&self, admitted: &VecDeque<Instant>, now: Instant) -> Duration {
        match admitted.front() {
            Some(oldest) => {
                let elapsed = now.duration_since(*oldest);
                self.time_window.saturating_sub(elapsed) + SAFETY_MARGIN
            }
            None => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_requests_are_not_delayed() {
        let limiter = AdmissionController::new(2, Duration::from_secs(60));

        assert_eq!(limiter.acquire().await, Duration::ZERO);
        assert_eq!(limiter.acquire().await, Duration::ZERO);
        assert_eq!(limiter.stats().in_window, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_third_and_fourth_requests_wait_for_window() {
        let limiter = AdmissionController::new(2, Duration::from_secs(60));

        limiter.acquire().await;
        limiter.acquire().await;

        assert_eq!(
            limiter.time_until_available(),
            Duration::from_secs(60) + SAFETY_MARGIN
        );

        let third = limiter.acquire().await;
        assert!(third >= Duration::from_secs(60));

        // Both early admissions have aged out, so the fourth joins the third.
        let fourth = limiter.acquire().await;
        assert_eq!(fourth, Duration::ZERO);
        assert_eq!(limiter.stats().in_window, 2);
        assert!(limiter.time_until_available() > Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_until_available_does_not_admit() {
        let limiter = AdmissionController::new(1, Duration::from_secs(10));

        assert_eq!(limiter.time_until_available(), Duration::ZERO);
        assert_eq!(limiter.time_until_available(), Duration::ZERO);
        assert_eq!(limiter.stats().in_window, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_budget_allocates_lazily() {
        let limiter = AdmissionController::new(usize::MAX, Duration::from_secs(60));

        assert_eq!(limiter.acquire().await, Duration::ZERO);
        let stats = limiter.stats();
        assert_eq!(stats.in_window, 1);
        assert_eq!(stats.max_requests, usize::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_never_exceeds_budget() {
        let window = Duration::from_secs(5);
        let limiter = AdmissionController::new(3, window);
        let mut admissions = Vec::new();

        for _ in 0..10 {
            limiter.acquire().await;
            admissions.push(Instant::now());
        }

        for (i, start) in admissions.iter().enumerate() {
            let in_window = admissions[i..]
                .iter()
                .take_while(|t| t.duration_since(*start) < window)
                .count();
            assert!(in_window <= 3, "{} admissions inside one window", in_window);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_window() {
        let window = Duration::from_secs(60);
        let limiter = AdmissionController::new(2, window);
        let started = Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter.acquire().await;
                    Instant::now()
                })
            })
            .collect();

        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap());
        }

        let immediate = finished.iter().filter(|t| **t == started).count();
        assert_eq!(immediate, 2);
        assert!(finished
            .iter()
            .filter(|t| **t != started)
            .all(|t| t.duration_since(started) >= window));
    }
}
