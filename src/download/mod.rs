//! Download item model.
//!
//! This module holds the data structures describing one tracked transfer job
//! and the state machine governing it.
//!
//! - [`item`] - [`DownloadItem`], its id and its mutable [`DownloadState`]
//! - [`status`] - [`Status`] and the allowed transitions
//! - [`request`] - [`DownloadRequest`] and the [`ContentProvider`] contract
//! - [`hash`] - checksum verification of finished files
//!
//! # Examples
//!
//! ```rust
//! use haul::download::{Status, DownloadItem, SourceRef, ContentInfo, TransferSpec};
//!
//! let mut item = DownloadItem::new(
//!     SourceRef::new("svc-1", "radarr"),
//!     ContentInfo::new("Sintel", "movie"),
//!     TransferSpec {
//!         source_url: "https://example.com/sintel.mkv".into(),
//!         destination_path: "/tmp/sintel.mkv".into(),
//!         file_name: "sintel.mkv".into(),
//!         mime_type: None,
//!         expected_size: 0,
//!         checksum: None,
//!     },
//!     3,
//! );
//! assert_eq!(item.status(), Status::Pending);
//! assert!(item.transition(Status::Downloading));
//! assert!(!item.transition(Status::Retrying));
//! ```

pub mod hash;
pub mod item;
pub mod request;
pub mod status;

pub use hash::{detect_hash_type, verify_hash, HashType};
pub use item::{
    ContentInfo, DownloadId, DownloadItem, DownloadState, SourceRef, TransferSpec,
    DEFAULT_MAX_RETRIES,
};
pub use request::{ContentProvider, DownloadRequest, ResolvedContent};
pub use status::Status;
