//! HMAC-SHA256 request signing.
//!
//! The signature covers `timestamp + METHOD + path + body`, where the
//! timestamp is Unix seconds in decimal, the path carries no host or query,
//! and the body is the exact byte sequence that goes on the wire.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::Credentials;
use crate::error::ConfigError;

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_APP_TOKEN: &str = "X-App-Token";
pub const HEADER_TIMESTAMP: &str = "X-App-Access-Ts";
pub const HEADER_SIGNATURE: &str = "X-App-Access-Sig";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";

/// Authentication headers for one outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeaders {
    pub app_token: String,
    pub timestamp: i64,
    pub signature: String,
}

impl AuthHeaders {
    /// All headers to attach, including the JSON content type.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            (HEADER_APP_TOKEN, self.app_token.clone()),
            (HEADER_TIMESTAMP, self.timestamp.to_string()),
            (HEADER_SIGNATURE, self.signature.clone()),
            (HEADER_CONTENT_TYPE, "application/json".into()),
        ]
    }
}

/// Signs requests with the shared secret.
#[derive(Clone)]
pub struct Signer {
    app_token: String,
    mac: HmacSha256,
}

impl Signer {
    pub fn new(credentials: &Credentials) -> Result<Self, ConfigError> {
        let mac = HmacSha256::new_from_slice(credentials.secret.as_bytes()).map_err(|e| {
            ConfigError::Invalid {
                name: "secret",
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            app_token: credentials.app_token.clone(),
            mac,
        })
    }

    /// Sign using the current wall-clock time.
    pub fn sign(&self, method: &str, path: &str, body: &[u8]) -> AuthHeaders {
        self.sign_at(chrono::Utc::now().timestamp(), method, path, body)
    }

    /// Sign for an explicit Unix timestamp (seconds).
    pub fn sign_at(&self, timestamp: i64, method: &str, path: &str, body: &[u8]) -> AuthHeaders {
        let mut mac = self.mac.clone();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(method.to_ascii_uppercase().as_bytes());
        mac.update(path.as_bytes());
        mac.update(body);
        AuthHeaders {
            app_token: self.app_token.clone(),
            timestamp,
            signature: hex::encode(mac.finalize().into_bytes()),
        }
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("app_token", &self.app_token)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer(secret: &str) -> Signer {
        Signer::new(&Credentials::new(Some("app-token".into()), Some(secret.into())).unwrap())
            .unwrap()
    }

    fn reference_hmac(secret: &str, data: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(data);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn known_hmac_vector() {
        assert_eq!(
            reference_hmac("key", b"The quick brown fox jumps over the lazy dog"),
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn signs_timestamp_method_path_and_body() {
        let body = br#"{"applicantId":"abc","forClientId":"client","ttlInSecs":1814400}"#;
        let headers = signer("secret").sign_at(1_234_567_890, "post", "/resources/accessTokens/shareToken", body);

        let mut expected = b"1234567890POST/resources/accessTokens/shareToken".to_vec();
        expected.extend_from_slice(body);

        assert_eq!(headers.app_token, "app-token");
        assert_eq!(headers.timestamp, 1_234_567_890);
        assert_eq!(headers.signature, reference_hmac("secret", &expected));
    }

    #[test]
    fn empty_body_still_yields_lowercase_hex_sha256() {
        let headers = signer("secret").sign_at(1, "GET", "/resources/status", b"");
        assert_eq!(headers.signature.len(), 64);
        assert!(headers
            .signature
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn signature_depends_on_every_component() {
        let s = signer("secret");
        let base = s.sign_at(100, "POST", "/a", b"{}").signature;
        assert_ne!(base, s.sign_at(101, "POST", "/a", b"{}").signature);
        assert_ne!(base, s.sign_at(100, "PUT", "/a", b"{}").signature);
        assert_ne!(base, s.sign_at(100, "POST", "/b", b"{}").signature);
        assert_ne!(base, s.sign_at(100, "POST", "/a", b"{ }").signature);
        assert_ne!(base, signer("other").sign_at(100, "POST", "/a", b"{}").signature);
    }

    #[test]
    fn header_pairs_carry_content_type() {
        let pairs = signer("secret").sign_at(7, "POST", "/a", b"").to_pairs();
        assert!(pairs.contains(&(HEADER_TIMESTAMP, "7".to_string())));
        assert!(pairs.contains(&(HEADER_CONTENT_TYPE, "application/json".to_string())));
    }
}
