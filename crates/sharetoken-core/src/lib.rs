//! sharetoken-core: resumable, rate-limited share-token batch processing.
//!
//! # Overview
//!
//! A run reads applicant rows from a CSV file, requests a share token for
//! each one and writes the outcomes to a result CSV that doubles as the
//! resume point for the next run. The core crate defines:
//!
//! - [`Signer`]: HMAC-SHA256 request signatures
//! - [`policy`] module: sliding-window rate limiter and retry policy
//! - [`RetryingTransport`]: one logical request over an [`HttpExchange`]
//! - [`TokenIssuer`]: the seam between the processor and the remote service
//! - [`ResultStore`]: skip index, stable merge and atomic persistence
//! - [`BatchProcessor`]: the per-record state machine and flush cadence

pub mod config;
pub mod error;
pub mod input;
pub mod issuer;
pub mod policy;
pub mod processor;
pub mod progress;
pub mod record;
pub mod shutdown;
pub mod signer;
pub mod store;
pub mod transport;

pub use config::{Credentials, ProcessorConfig};
pub use error::{ConfigError, InputError, IssueError, ProcessError, StoreError, TransportError};
pub use issuer::{ShareTokenRequest, TokenGrant, TokenIssuer, SHARE_TOKEN_PATH};
pub use processor::{BatchProcessor, Mode, ProcessEvent, RecordStatus, RunSummary};
pub use progress::{Counts, ProgressSnapshot};
pub use record::{InputRecord, OutcomeRecord};
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use signer::{AuthHeaders, Signer};
pub use store::{merge_stable, ResultStore};
pub use transport::{ApiRequest, ApiResponse, HttpExchange, RetryingTransport, SendOutcome};
