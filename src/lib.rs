//! Haul is a crate providing a persistent download queue with bounded
//! concurrency, throttled progress, storage admission checks and
//! pause/resume/cancel/retry.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use haul::{ContentInfo, DownloadManager, DownloadRequest, Error, SourceRef};
//! use haul::persistence::FileStore;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Error> {
//! let manager = DownloadManager::builder()
//!     .download_directory("output".into())
//!     .store(FileStore::new("state"))
//!     .build()
//!     .await?;
//!
//! let request = DownloadRequest::from_url(
//!     "https://github.com/seanmonstar/reqwest/archive/refs/tags/v0.11.9.zip",
//!     "output",
//!     SourceRef::new("github", "release"),
//!     ContentInfo::new("reqwest 0.11.9", "archive"),
//! )?;
//! manager.add_download(request).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`download`] - The download item model, its state machine and requests
//! - [`manager`] - The `DownloadManager` handle, its builder, configuration and events
//! - [`transfer`] - The executor contract and the HTTP executor
//! - [`progress`] - Throttling of raw transfer progress
//! - [`storage`] - Free space and quota checks
//! - [`persistence`] - Key-value stores and state recovery
//! - [`error`] - Centralized error handling with the `Error` enum
//! - [`utils`] - Shared utility functions

pub mod download;
pub mod error;
pub mod manager;
pub mod persistence;
pub mod progress;
pub mod storage;
pub mod transfer;
pub mod utils;

pub use download::{
    ContentInfo, DownloadId, DownloadItem, DownloadRequest, SourceRef, Status, TransferSpec,
};
pub use error::{Error, Result, TransferError, TransferErrorKind};
pub use manager::{DownloadEvent, DownloadManager, DownloadManagerBuilder, ManagerConfig};
pub use transfer::{HttpExecutor, TransferExecutor};
