//! Sliding-window rate limiter.
//!
//! Keeps the monotonic timestamps of recent admissions. A new request is
//! admitted only if fewer than `max_requests` admissions fall inside the
//! trailing `window`; otherwise the caller waits until the oldest one ages
//! out. Eviction, the capacity check and recording the admission happen
//! under one lock, so concurrent callers can never share a free slot.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Length of the trailing window.
    pub window: Duration,
    /// Maximum admissions inside any window.
    pub max_requests: usize,
    /// Extra wait added so the oldest entry is strictly out of the window.
    pub epsilon: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(5),
            max_requests: 40,
            epsilon: Duration::from_millis(10),
        }
    }
}

/// Thread-safe sliding-window rate limiter.
pub struct RateLimiter {
    config: RateLimiterConfig,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            admitted: Mutex::new(VecDeque::with_capacity(config.max_requests)),
            config,
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Wait until a request may be sent, then record it.
    pub async fn admit(&self) {
        loop {
            match self.try_admit_at(Instant::now()) {
                Ok(()) => return,
                Err(wait) => {
                    tracing::info!(
                        wait_ms = wait.as_millis() as u64,
                        max_requests = self.config.max_requests,
                        window_ms = self.config.window.as_millis() as u64,
                        "rate limit reached, sleeping"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Admit at `now` if there is room, otherwise return how long to wait.
    pub fn try_admit_at(&self, now: Instant) -> Result<(), Duration> {
        let mut admitted = self.admitted.lock().unwrap_or_else(PoisonError::into_inner);

        while let Some(&oldest) = admitted.front() {
            if now.saturating_duration_since(oldest) >= self.config.window {
                admitted.pop_front();
            } else {
                break;
            }
        }

        if admitted.len() >= self.config.max_requests {
            let oldest = admitted.front().copied().unwrap_or(now);
            let age = now.saturating_duration_since(oldest);
            return Err(self.config.window.saturating_sub(age) + self.config.epsilon);
        }

        admitted.push_back(now);
        Ok(())
    }

    /// Number of admissions currently inside the window ending at `now`.
    pub fn in_window_at(&self, now: Instant) -> usize {
        let admitted = self.admitted.lock().unwrap_or_else(PoisonError::into_inner);
        admitted
            .iter()
            .filter(|&&t| now.saturating_duration_since(t) < self.config.window)
            .count()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
