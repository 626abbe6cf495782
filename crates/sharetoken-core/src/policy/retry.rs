//! Exponential backoff retry policy with uniform jitter.

use std::time::Duration;

use rand::Rng;

/// HTTP statuses worth another attempt.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Configuration for the retry policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts per logical request, the first one included.
    pub max_attempts: u32,
    /// Backoff before the second attempt.
    pub base_backoff: Duration,
    /// Multiplier applied to backoff on each further attempt.
    pub multiplier: f64,
    /// Upper bound of the uniform random jitter added to every backoff.
    pub max_jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(500),
            multiplier: 2.0,
            max_jitter: Duration::from_millis(250),
        }
    }
}

/// Stateless retry policy. Computes the next delay given the attempt number.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns `true` if another attempt may follow the `attempt`-th (1-based).
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.config.max_attempts
    }

    /// Exponential part of the delay after the `attempt`-th failure.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        self.config
            .base_backoff
            .mul_f64(self.config.multiplier.powi(exp))
    }

    /// Full delay after the `attempt`-th failure: exponential part plus jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let jitter_max = self.config.max_jitter.as_secs_f64();
        let jitter = if jitter_max > 0.0 {
            rand::thread_rng().gen_range(0.0..=jitter_max)
        } else {
            0.0
        };
        self.base_delay(attempt) + Duration::from_secs_f64(jitter)
    }

    /// Delay before the attempt following the `attempt`-th, or `None` when the
    /// budget is spent. A server-provided `Retry-After` replaces the backoff.
    pub fn next_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Option<Duration> {
        if !self.should_retry(attempt) {
            return None;
        }
        Some(retry_after.unwrap_or_else(|| self.backoff(attempt)))
    }

    /// Whether an HTTP status is transient.
    pub fn is_retryable_status(status: u16) -> bool {
        RETRYABLE_STATUSES.contains(&status)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

/// Parse a `Retry-After` header given in (possibly fractional) seconds.
///
/// HTTP-date values, negative or non-finite numbers and values too large for
/// a `Duration` yield `None`, so the normal backoff applies.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}
