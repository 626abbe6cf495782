//! Policy engine: admission control and retry timing for outbound requests.
//!
//! The policy stack (applied per attempt):
//! ```text
//! Request → [RateLimiter] → [Signer] → [HttpExchange] → [RetryPolicy]
//! ```

pub mod rate_limiter;
pub mod retry;

pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use retry::{RetryConfig, RetryPolicy};
