//! Run configuration values.
//!
//! Everything here is an immutable value handed to constructors; nothing is
//! read from globals once the run has started.

use std::time::Duration;

use crate::error::ConfigError;

/// Client the issued share tokens are scoped to.
pub const DEFAULT_CLIENT_ID: &str = "reap.global_116803";

/// Lifetime of an issued token: 21 days.
pub const DEFAULT_TTL_SECS: u64 = 21 * 24 * 60 * 60;

/// Default number of processed records between durable flushes.
pub const DEFAULT_FLUSH_BATCH_SIZE: usize = 100;

/// Token value written for simulated successes.
pub const DRY_RUN_TOKEN: &str = "DRY_RUN";

/// Configuration for a `BatchProcessor` run.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Flush merged results to disk after this many processed records.
    pub flush_batch_size: usize,
    /// Client id sent with every token request and recorded in the output.
    pub client_id: String,
    /// Requested token lifetime in seconds.
    pub ttl_secs: u64,
    /// Minimum wall time between two progress reports.
    pub progress_interval: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            flush_batch_size: DEFAULT_FLUSH_BATCH_SIZE,
            client_id: DEFAULT_CLIENT_ID.into(),
            ttl_secs: DEFAULT_TTL_SECS,
            progress_interval: Duration::from_secs(5),
        }
    }
}

impl ProcessorConfig {
    /// Override the flush batch size.
    pub fn with_flush_batch_size(mut self, size: usize) -> Self {
        self.flush_batch_size = size;
        self
    }

    /// Reject settings the processor cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_batch_size == 0 {
            return Err(ConfigError::Invalid {
                name: "flush_batch_size",
                reason: "must be at least 1".into(),
            });
        }
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                name: "client_id",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }
}

/// API credentials used to sign requests.
#[derive(Clone)]
pub struct Credentials {
    pub app_token: String,
    pub secret: String,
}

impl Credentials {
    /// Build credentials, rejecting missing or blank values.
    pub fn new(
        app_token: Option<String>,
        secret: Option<String>,
    ) -> Result<Self, ConfigError> {
        let app_token = app_token
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingCredential("app token"))?;
        let secret = secret
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::MissingCredential("secret"))?;
        Ok(Self { app_token, secret })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("app_token", &self.app_token)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_service_contract() {
        let cfg = ProcessorConfig::default();
        assert_eq!(cfg.flush_batch_size, 100);
        assert_eq!(cfg.ttl_secs, 1_814_400);
        assert_eq!(cfg.client_id, "reap.global_116803");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let cfg = ProcessorConfig::default().with_flush_batch_size(0);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { name: "flush_batch_size", .. })
        ));
    }

    #[test]
    fn blank_credentials_are_missing() {
        let err = Credentials::new(Some("tok".into()), Some("  ".into())).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential("secret")));
        let err = Credentials::new(None, Some("s".into())).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential("app token")));
    }

    #[test]
    fn debug_output_redacts_secret() {
        let creds = Credentials::new(Some("tok".into()), Some("hunter2".into())).unwrap();
        let dbg = format!("{creds:?}");
        assert!(!dbg.contains("hunter2"));
    }
}
