//! Lifecycle events published by the manager.
//!
//! Events are broadcast to every subscriber of
//! [`DownloadManager::subscribe`](super::DownloadManager::subscribe). They
//! serialize to JSON objects tagged with a camelCase `type` field so UI and
//! notification layers in other processes can consume them directly.
//!
//! ```rust
//! use haul::manager::DownloadEvent;
//!
//! let event = DownloadEvent::QueueUpdated { queue_size: 2 };
//! assert_eq!(
//!     serde_json::to_string(&event).unwrap(),
//!     r#"{"type":"queueUpdated","queueSize":2}"#
//! );
//! ```

use crate::download::{DownloadId, DownloadItem, Status};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Number of events buffered per subscriber before the slowest one lags.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DownloadEvent {
    QueueUpdated {
        queue_size: usize,
    },
    DownloadProgress {
        id: DownloadId,
        progress: f64,
        bytes_downloaded: u64,
        speed: f64,
        eta: f64,
    },
    DownloadCompleted {
        id: DownloadId,
        local_path: PathBuf,
    },
    DownloadFailed {
        id: DownloadId,
        error: String,
        can_retry: bool,
    },
    DownloadPaused {
        id: DownloadId,
    },
    DownloadResumed {
        id: DownloadId,
    },
    DownloadCancelled {
        id: DownloadId,
    },
    DownloadRetrying {
        id: DownloadId,
        attempt: u32,
    },
    /// Admitting a download pushes the download directory over the quota.
    StorageWarning {
        usage: u64,
        limit: u64,
    },
}

impl DownloadEvent {
    /// The download this event is about, if any.
    pub fn id(&self) -> Option<DownloadId> {
        match self {
            DownloadEvent::DownloadProgress { id, .. }
            | DownloadEvent::DownloadCompleted { id, .. }
            | DownloadEvent::DownloadFailed { id, .. }
            | DownloadEvent::DownloadPaused { id }
            | DownloadEvent::DownloadResumed { id }
            | DownloadEvent::DownloadCancelled { id }
            | DownloadEvent::DownloadRetrying { id, .. } => Some(*id),
            DownloadEvent::QueueUpdated { .. } | DownloadEvent::StorageWarning { .. } => None,
        }
    }

    pub(crate) fn progress(item: &DownloadItem) -> Self {
        DownloadEvent::DownloadProgress {
            id: item.id,
            progress: item.state.progress,
            bytes_downloaded: item.state.bytes_downloaded,
            speed: item.state.speed,
            eta: item.state.eta,
        }
    }
}

/// Counts of the downloads tracked by the manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub downloading: usize,
    pub paused: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub retrying: usize,
    /// Ids waiting in the queue.
    pub queued: usize,
    /// Ids holding a concurrency slot.
    pub active: usize,
}

impl QueueStats {
    pub(crate) fn count(&mut self, status: Status) {
        self.total += 1;
        match status {
            Status::Pending => self.pending += 1,
            Status::Downloading => self.downloading += 1,
            Status::Paused => self.paused += 1,
            Status::Completed => self.completed += 1,
            Status::Failed => self.failed += 1,
            Status::Cancelled => self.cancelled += 1,
            Status::Retrying => self.retrying += 1,
        }
    }
}
