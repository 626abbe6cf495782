//! The `HttpExchange` trait and the retrying transport built on top of it.
//!
//! An exchange performs exactly one HTTP round trip. [`RetryingTransport`]
//! turns that into one *logical* request: it waits for the rate limiter
//! before every attempt, signs each attempt afresh, classifies the result
//! and backs off between retryable failures.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::policy::retry::parse_retry_after;
use crate::policy::{RateLimiter, RetryPolicy};
use crate::shutdown::Shutdown;
use crate::signer::Signer;

/// A request ready to be signed and sent.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: String,
    /// Path relative to the service base URL, without query.
    pub path: String,
    /// Exact body bytes; the signature is computed over these.
    pub body: Vec<u8>,
}

impl ApiRequest {
    pub fn post(path: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: "POST".into(),
            path: path.into(),
            body,
        }
    }
}

/// Raw response of one HTTP round trip.
#[derive(Debug, Clone, Default)]
pub struct ApiResponse {
    pub status: u16,
    /// Header names lowercased.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        self.status < 400
    }

    /// Body as text, lossily decoded, for logs and error messages.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// One HTTP round trip against the token service.
///
/// Implementations must be `Send + Sync`; the trait is object-safe and can be
/// stored as `Arc<dyn HttpExchange>`.
#[async_trait]
pub trait HttpExchange: Send + Sync + 'static {
    /// Send `req` with the given headers; no retries.
    async fn execute(
        &self,
        req: &ApiRequest,
        headers: &[(&'static str, String)],
    ) -> Result<ApiResponse, TransportError>;

    /// Identifier for logs (base URL or name).
    fn url(&self) -> &str;
}

/// Classification of a single attempt.
#[derive(Debug)]
pub enum Attempt {
    Success(ApiResponse),
    Retryable {
        reason: String,
        retry_after: Option<Duration>,
        last: Result<ApiResponse, TransportError>,
    },
    Terminal(ApiResponse),
    /// The request could not be sent and sending it again would not help.
    Fatal(TransportError),
}

impl Attempt {
    pub fn classify(result: Result<ApiResponse, TransportError>) -> Self {
        match result {
            Ok(resp) if resp.is_success() => Self::Success(resp),
            Ok(resp) if RetryPolicy::is_retryable_status(resp.status) => Self::Retryable {
                reason: format!("HTTP {}", resp.status),
                retry_after: resp.header("retry-after").and_then(parse_retry_after),
                last: Ok(resp),
            },
            Ok(resp) => Self::Terminal(resp),
            Err(e) if e.is_retryable() => Self::Retryable {
                reason: e.to_string(),
                retry_after: None,
                last: Err(e),
            },
            Err(e) => Self::Fatal(e),
        }
    }
}

/// Final result of a logical request.
#[derive(Debug)]
pub enum SendOutcome {
    /// Status < 400.
    Delivered(ApiResponse),
    /// Non-retryable status, or the last retryable response once the
    /// attempt budget is spent.
    Rejected(ApiResponse),
    /// Every attempt failed before a response arrived.
    Unreachable(TransportError),
    /// Shutdown was requested while waiting.
    Cancelled,
}

/// Rate-limited, signed, retrying request sender.
pub struct RetryingTransport {
    exchange: Arc<dyn HttpExchange>,
    signer: Signer,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    shutdown: Shutdown,
}

impl RetryingTransport {
    pub fn new(
        exchange: Arc<dyn HttpExchange>,
        signer: Signer,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            exchange,
            signer,
            limiter,
            retry,
            shutdown: Shutdown::never(),
        }
    }

    /// Make limiter waits and backoff sleeps interruptible.
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn url(&self) -> &str {
        self.exchange.url()
    }

    /// Send one logical request with the configured retry budget.
    pub async fn send(&self, req: &ApiRequest) -> SendOutcome {
        let mut attempt = 0u32;
        loop {
            attempt += 1;

            tokio::select! {
                _ = self.limiter.admit() => {}
                _ = self.shutdown.triggered() => return SendOutcome::Cancelled,
            }

            let headers = self.signer.sign(&req.method, &req.path, &req.body).to_pairs();
            let result = self.exchange.execute(req, &headers).await;

            match Attempt::classify(result) {
                Attempt::Success(resp) => return SendOutcome::Delivered(resp),
                Attempt::Terminal(resp) => {
                    tracing::debug!(
                        attempt,
                        status = resp.status,
                        url = %self.exchange.url(),
                        "non-retryable response"
                    );
                    return SendOutcome::Rejected(resp);
                }
                Attempt::Fatal(e) => {
                    tracing::error!(attempt, error = %e, "request cannot be sent");
                    return SendOutcome::Unreachable(e);
                }
                Attempt::Retryable {
                    reason,
                    retry_after,
                    last,
                } => match self.retry.next_delay(attempt, retry_after) {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            max_attempts = self.retry.config.max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            retry_after = retry_after.is_some(),
                            error = %reason,
                            "retrying request"
                        );
                        if !self.shutdown.sleep(delay).await {
                            return SendOutcome::Cancelled;
                        }
                    }
                    None => {
                        tracing::error!(
                            attempt,
                            error = %reason,
                            url = %self.exchange.url(),
                            "max attempts exceeded"
                        );
                        return match last {
                            Ok(resp) => SendOutcome::Rejected(resp),
                            Err(e) => SendOutcome::Unreachable(e),
                        };
                    }
                },
            }
        }
    }
}

impl std::fmt::Debug for RetryingTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingTransport")
            .field("url", &self.exchange.url())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
