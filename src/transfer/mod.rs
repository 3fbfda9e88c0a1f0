//! Transfer execution.
//!
//! The scheduler does not move bytes itself. It hands every download to a
//! [`TransferExecutor`] and reacts to the outcome and to the progress reported
//! through a [`ProgressReporter`].
//!
//! - [`executor`] - the executor contract and its request/outcome types
//! - [`http`] - [`HttpExecutor`], a resumable reqwest-based executor
//! - [`client`] - HTTP client construction with retry and tracing middleware

pub mod client;
pub mod executor;
pub mod http;

pub use client::{create_http_client, HttpClientConfig};
pub use executor::{
    ProgressReporter, TransferExecutor, TransferOutcome, TransferProgress, TransferRequest,
    PROGRESS_CHANNEL_CAPACITY,
};
pub use http::HttpExecutor;
