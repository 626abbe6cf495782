//! Single-attempt HTTP exchange backed by `reqwest`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION, USER_AGENT};
use reqwest::Method;

use sharetoken_core::error::TransportError;
use sharetoken_core::transport::{ApiRequest, ApiResponse, HttpExchange};

/// Sends requests to `base_url + path`, one attempt each.
pub struct ReqwestExchange {
    base_url: String,
    http: reqwest::Client,
    timeout: Duration,
}

impl ReqwestExchange {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, TransportError> {
        let mut defaults = HeaderMap::new();
        defaults.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?,
        );
        defaults.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(defaults)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            timeout,
        })
    }

    fn map_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                ms: self.timeout.as_millis() as u64,
            }
        } else if e.is_builder() {
            TransportError::InvalidRequest(e.to_string())
        } else {
            TransportError::Http(e.to_string())
        }
    }
}

#[async_trait]
impl HttpExchange for ReqwestExchange {
    async fn execute(
        &self,
        req: &ApiRequest,
        headers: &[(&'static str, String)],
    ) -> Result<ApiResponse, TransportError> {
        let method = Method::from_bytes(req.method.to_ascii_uppercase().as_bytes())
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        let mut header_map = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
            header_map.insert(name, value);
        }

        // Raw bytes: the signature covers exactly this body.
        let resp = self
            .http
            .request(method, format!("{}{}", self.base_url, req.path))
            .headers(header_map)
            .body(req.body.clone())
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = resp.status().as_u16();
        let headers: HashMap<String, String> = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let body = resp.bytes().await.map_err(|e| self.map_error(e))?.to_vec();

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }

    fn url(&self) -> &str {
        &self.base_url
    }
}
