//! The `TokenIssuer` seam between the processor and the remote service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IssueError;

/// Path of the share-token endpoint.
pub const SHARE_TOKEN_PATH: &str = "/resources/accessTokens/shareToken";

/// Body of a share-token request.
///
/// Field order is the wire order and is part of the signed bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShareTokenRequest<'a> {
    #[serde(rename = "applicantId")]
    pub subject_id: &'a str,
    #[serde(rename = "forClientId")]
    pub client_id: &'a str,
    #[serde(rename = "ttlInSecs")]
    pub ttl_secs: u64,
}

impl ShareTokenRequest<'_> {
    /// Compact JSON, exactly as sent and signed.
    pub fn to_body(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// A token issued by the service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub token: String,
    #[serde(rename = "forClientId", default)]
    pub client_id: Option<String>,
}

/// Issues share tokens for subjects.
///
/// Implementations must be `Send + Sync` and are stored as
/// `Arc<dyn TokenIssuer>`.
#[async_trait]
pub trait TokenIssuer: Send + Sync + 'static {
    /// Obtain a token for `subject_id`, retrying internally as configured.
    async fn issue(&self, subject_id: &str) -> Result<TokenGrant, IssueError>;
}
