//! Share-token client: payload building, signing, retries and response parsing.
//!
//! Features:
//! - Sliding-window rate limiting shared by every request of the process
//! - Exponential backoff with jitter for network faults and 429/5xx
//! - `Retry-After` support
//! - HMAC-signed raw JSON bodies

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use sharetoken_core::config::{Credentials, DEFAULT_CLIENT_ID, DEFAULT_TTL_SECS};
use sharetoken_core::error::{ConfigError, IssueError};
use sharetoken_core::issuer::{ShareTokenRequest, TokenGrant, TokenIssuer, SHARE_TOKEN_PATH};
use sharetoken_core::policy::{RateLimiter, RateLimiterConfig, RetryConfig, RetryPolicy};
use sharetoken_core::shutdown::Shutdown;
use sharetoken_core::signer::Signer;
use sharetoken_core::transport::{ApiRequest, ApiResponse, HttpExchange, RetryingTransport, SendOutcome};

use crate::exchange::ReqwestExchange;

pub const DEFAULT_BASE_URL: &str = "https://api.sumsub.com";

/// Configuration for `ShareTokenClient`.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub base_url: String,
    pub client_id: String,
    pub ttl_secs: u64,
    pub retry: RetryConfig,
    pub rate_limiter: RateLimiterConfig,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            client_id: DEFAULT_CLIENT_ID.into(),
            ttl_secs: DEFAULT_TTL_SECS,
            retry: RetryConfig::default(),
            rate_limiter: RateLimiterConfig::default(),
            request_timeout: Duration::from_secs(30),
            user_agent: format!("sharetoken/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Issues share tokens over HTTP with built-in reliability features.
pub struct ShareTokenClient {
    transport: RetryingTransport,
    client_id: String,
    ttl_secs: u64,
}

impl ShareTokenClient {
    /// Create a client talking to `config.base_url` through `reqwest`.
    pub fn new(credentials: &Credentials, config: HttpClientConfig) -> Result<Self, ConfigError> {
        let exchange = ReqwestExchange::new(&config.base_url, config.request_timeout, &config.user_agent)
            .map_err(|e| ConfigError::Invalid {
                name: "http client",
                reason: e.to_string(),
            })?;
        Self::with_exchange(Arc::new(exchange), credentials, config)
    }

    /// Create a client over any exchange (used for custom transports and tests).
    pub fn with_exchange(
        exchange: Arc<dyn HttpExchange>,
        credentials: &Credentials,
        config: HttpClientConfig,
    ) -> Result<Self, ConfigError> {
        let signer = Signer::new(credentials)?;
        let limiter = Arc::new(RateLimiter::new(config.rate_limiter));
        Ok(Self {
            transport: RetryingTransport::new(exchange, signer, limiter, RetryPolicy::new(config.retry)),
            client_id: config.client_id,
            ttl_secs: config.ttl_secs,
        })
    }

    /// Abort limiter waits and backoff sleeps once shutdown is requested.
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.transport = self.transport.with_shutdown(shutdown);
        self
    }

    pub fn url(&self) -> &str {
        self.transport.url()
    }

    fn parse_grant(resp: &ApiResponse) -> Result<TokenGrant, IssueError> {
        serde_json::from_slice::<TokenGrant>(&resp.body)
            .map_err(|e| IssueError::Unusable(format!("HTTP {}: {e}", resp.status)))
    }
}

#[async_trait]
impl TokenIssuer for ShareTokenClient {
    async fn issue(&self, subject_id: &str) -> Result<TokenGrant, IssueError> {
        let payload = ShareTokenRequest {
            subject_id,
            client_id: &self.client_id,
            ttl_secs: self.ttl_secs,
        };
        let body = payload
            .to_body()
            .map_err(|e| IssueError::Unusable(format!("cannot encode request: {e}")))?;
        tracing::debug!(
            subject_id,
            body = %String::from_utf8_lossy(&body),
            "requesting share token"
        );

        match self.transport.send(&ApiRequest::post(SHARE_TOKEN_PATH, body)).await {
            SendOutcome::Delivered(resp) => Self::parse_grant(&resp),
            SendOutcome::Rejected(resp) => Err(IssueError::Rejected {
                status: resp.status,
                body: resp.text(),
            }),
            SendOutcome::Unreachable(e) => Err(IssueError::Unreachable(e)),
            SendOutcome::Cancelled => Err(IssueError::Cancelled),
        }
    }
}

impl std::fmt::Debug for ShareTokenClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareTokenClient")
            .field("url", &self.url())
            .field("client_id", &self.client_id)
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}
