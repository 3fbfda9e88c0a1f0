//! The download item model.
//!
//! A [`DownloadItem`] is one tracked transfer job. Its identity, provider
//! reference, content snapshot and transfer description are fixed at creation;
//! only [`DownloadState`] changes afterwards, and only the scheduler changes it.

use super::status::Status;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Default number of retries allowed per download.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Opaque unique identifier of a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadId(Uuid);

impl DownloadId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DownloadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DownloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for DownloadId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Reference to the service the content comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    /// Identifier of the configured service.
    pub service_id: String,
    /// Kind of service, e.g. `"radarr"`.
    pub service_type: String,
}

impl SourceRef {
    pub fn new(service_id: impl Into<String>, service_type: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            service_type: service_type.into(),
        }
    }
}

/// Display metadata captured when the download is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentInfo {
    /// Title shown to the user.
    pub title: String,
    /// Kind of content, e.g. `"movie"` or `"episode"`.
    pub content_type: String,
    /// Size announced by the provider, if any.
    pub size_hint: Option<u64>,
}

impl ContentInfo {
    pub fn new(title: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content_type: content_type.into(),
            size_hint: None,
        }
    }
}

/// What to fetch and where to put it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSpec {
    /// URL of the remote file.
    pub source_url: String,
    /// Absolute path of the file on disk.
    pub destination_path: PathBuf,
    /// File name used to save the file on disk.
    pub file_name: String,
    /// MIME type reported by the provider.
    pub mime_type: Option<String>,
    /// Expected size in bytes, 0 when unknown.
    pub expected_size: u64,
    /// Expected SHA-256 of the file.
    pub checksum: Option<String>,
}

/// Mutable part of a download item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadState {
    pub status: Status,
    /// Fraction in `[0, 1]`.
    pub progress: f64,
    pub bytes_downloaded: u64,
    pub total_bytes: u64,
    /// Bytes per second.
    pub speed: f64,
    /// Seconds remaining.
    pub eta: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl DownloadState {
    fn new(total_bytes: u64, max_retries: u32) -> Self {
        let now = Utc::now();
        Self {
            status: Status::Pending,
            progress: 0.0,
            bytes_downloaded: 0,
            total_bytes,
            speed: 0.0,
            eta: 0.0,
            created_at: now,
            updated_at: now,
            completed_at: None,
            error_message: None,
            retry_count: 0,
            max_retries,
        }
    }
}

/// One tracked transfer job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadItem {
    pub id: DownloadId,
    pub source: SourceRef,
    pub content: ContentInfo,
    pub transfer: TransferSpec,
    pub state: DownloadState,
}

impl DownloadItem {
    /// Creates a pending item with a fresh id.
    pub fn new(
        source: SourceRef,
        content: ContentInfo,
        transfer: TransferSpec,
        max_retries: u32,
    ) -> Self {
        let state = DownloadState::new(transfer.expected_size, max_retries);
        Self {
            id: DownloadId::new(),
            source,
            content,
            transfer,
            state,
        }
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.state.status
    }

    /// Moves to `next` if the state machine allows it.
    ///
    /// Returns false and leaves the item untouched otherwise.
    pub fn transition(&mut self, next: Status) -> bool {
        if !self.state.status.can_transition_to(next) {
            return false;
        }
        self.state.status = next;
        self.touch();
        true
    }

    /// Whether another retry is still allowed.
    pub fn can_retry(&self) -> bool {
        self.state.retry_count < self.state.max_retries
    }

    /// Marks the item as successfully finished.
    pub fn complete(&mut self) -> bool {
        if !self.transition(Status::Completed) {
            return false;
        }
        let now = Utc::now();
        self.state.progress = 1.0;
        if self.state.total_bytes > 0 {
            self.state.bytes_downloaded = self.state.total_bytes;
        }
        self.state.speed = 0.0;
        self.state.eta = 0.0;
        self.state.completed_at = Some(now);
        self.state.error_message = None;
        true
    }

    /// Marks the item as failed with a user facing message.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if !self.transition(Status::Failed) {
            return false;
        }
        self.state.speed = 0.0;
        self.state.eta = 0.0;
        self.state.error_message = Some(message.into());
        true
    }

    /// Clears byte counters ahead of a fresh attempt and consumes one retry.
    pub fn prepare_retry(&mut self) -> bool {
        if !self.can_retry() || !self.transition(Status::Retrying) {
            return false;
        }
        self.state.progress = 0.0;
        self.state.bytes_downloaded = 0;
        self.state.speed = 0.0;
        self.state.eta = 0.0;
        self.state.error_message = None;
        self.state.retry_count += 1;
        true
    }

    /// Records byte-level progress.
    ///
    /// `bytes_expected` of 0 keeps the previously known total.
    pub fn record_progress(&mut self, bytes_written: u64, bytes_expected: u64, speed: f64, eta: f64) {
        let mut total = if bytes_expected > 0 {
            bytes_expected
        } else {
            self.state.total_bytes
        };
        if total > 0 && bytes_written > total {
            total = bytes_written;
        }

        self.state.bytes_downloaded = bytes_written;
        self.state.total_bytes = total;
        self.state.progress = if total > 0 {
            (bytes_written as f64 / total as f64).clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.state.speed = speed;
        self.state.eta = eta;
        self.touch();
    }

    /// Demotes a completed item whose file disappeared from disk.
    pub(crate) fn mark_file_missing(&mut self) {
        self.state.status = Status::Failed;
        self.state.progress = 0.0;
        self.state.bytes_downloaded = 0;
        self.state.completed_at = None;
        self.state.error_message = Some("Downloaded file is missing".to_string());
        self.touch();
    }

    fn touch(&mut self) {
        self.state.updated_at = Utc::now();
    }
}
