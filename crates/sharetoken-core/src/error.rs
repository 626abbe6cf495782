//! Error types for the share-token pipeline.
//!
//! Per-record failures never surface here: they become `Failed` outcomes in
//! the result file. Only transport plumbing, persistence and fatal
//! configuration/input problems are modelled as errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during a single HTTP exchange.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection refused/reset, DNS failure, broken body stream, etc.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Request timed out after the configured duration.
    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The request could not even be built (bad URL, bad header value).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Returns `true` if this error is transient and the request may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Timeout { .. })
    }
}

/// Why a token could not be obtained for one subject.
#[derive(Debug, Error)]
pub enum IssueError {
    /// Remote answered with a non-retryable status, or the retry budget ran
    /// out while it kept answering with retryable ones.
    #[error("rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Every attempt failed at the network level.
    #[error("service unreachable: {0}")]
    Unreachable(TransportError),

    /// Remote answered successfully but the body is not a usable token grant.
    #[error("unusable response: {0}")]
    Unusable(String),

    /// Shutdown was requested while waiting to send or to retry.
    #[error("cancelled by shutdown")]
    Cancelled,
}

/// Errors reading or writing the result file.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on '{}': {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Errors reading the input file. All of them are fatal for the run.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("input file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("input file '{}' is missing required columns: {}", path.display(), missing.join(", "))]
    MissingColumns { path: PathBuf, missing: Vec<String> },

    #[error("failed to read input file '{}': {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Invalid configuration detected before any processing starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required credential: {0}")]
    MissingCredential(&'static str),

    #[error("invalid setting '{name}': {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Errors that halt a batch run.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Input(#[from] InputError),

    /// The mandatory final write of the result file failed.
    #[error("final write of results failed: {0}")]
    FinalWrite(#[source] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_are_retryable() {
        assert!(TransportError::Http("connection reset".into()).is_retryable());
        assert!(TransportError::Timeout { ms: 30_000 }.is_retryable());
        assert!(!TransportError::InvalidRequest("bad header".into()).is_retryable());
    }

    #[test]
    fn missing_columns_message_lists_every_column() {
        let err = InputError::MissingColumns {
            path: PathBuf::from("in.csv"),
            missing: vec!["externalId".into(), "applicantLevel".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("externalId, applicantLevel"), "{msg}");
    }
}
