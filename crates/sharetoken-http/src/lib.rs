//! sharetoken-http: `reqwest` transport and share-token client.
//!
//! [`ReqwestExchange`] performs single HTTP round trips;
//! [`ShareTokenClient`] wraps it in the core retrying transport and
//! implements [`sharetoken_core::TokenIssuer`].

pub mod client;
pub mod exchange;

pub use client::{HttpClientConfig, ShareTokenClient, DEFAULT_BASE_URL};
pub use exchange::ReqwestExchange;
