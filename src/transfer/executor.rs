//! The transfer executor contract.
//!
//! An executor performs the actual byte transfer of one download. The scheduler
//! calls [`TransferExecutor::start`] in a task of its own and reacts to the
//! outcome; it never drives the transfer itself.
//!
//! Pausing or cancelling a download first calls [`TransferExecutor::pause`]
//! and then drops the future returned by `start`. Executors must therefore be
//! cancel-safe: dropping the future stops the transfer and leaves whatever was
//! already written in the destination file.

use crate::download::{DownloadId, DownloadItem};
use crate::error::TransferError;

use async_trait::async_trait;
use reqwest::StatusCode;
use std::path::PathBuf;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Number of progress reports buffered per transfer before new ones are dropped.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 32;

/// Parameters of one transfer attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub id: DownloadId,
    pub source_url: String,
    pub destination_path: PathBuf,
    /// Expected size in bytes, 0 when unknown.
    pub expected_size: u64,
    /// Expected SHA-256 of the finished file.
    pub checksum: Option<String>,
    /// Bytes the scheduler believes are already on disk.
    pub resume_from: u64,
    /// Whether the transfer may use a metered (mobile) connection.
    ///
    /// Advisory: only executors that can tell the link type apart act on it.
    /// [`HttpExecutor`](super::HttpExecutor) cannot and ignores it.
    pub allow_metered: bool,
}

impl TransferRequest {
    pub(crate) fn for_item(item: &DownloadItem, allow_metered: bool) -> Self {
        Self {
            id: item.id,
            source_url: item.transfer.source_url.clone(),
            destination_path: item.transfer.destination_path.clone(),
            expected_size: item.transfer.expected_size,
            checksum: item.transfer.checksum.clone(),
            resume_from: item.state.bytes_downloaded,
            allow_metered,
        }
    }
}

/// Result of a transfer that ran to its end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Status reported by the remote end.
    pub status: StatusCode,
    /// Where the file ended up.
    pub final_path: PathBuf,
}

impl TransferOutcome {
    /// A successful outcome.
    pub fn ok(final_path: impl Into<PathBuf>) -> Self {
        Self {
            status: StatusCode::OK,
            final_path: final_path.into(),
        }
    }

    /// Whether the outcome counts as a finished download.
    pub fn is_ok(&self) -> bool {
        self.status.is_success()
    }
}

/// Raw byte-level progress of a running transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub bytes_written: u64,
    /// 0 when unknown.
    pub bytes_expected: u64,
}

/// Sending half of a transfer's bounded progress channel.
///
/// Reports never block: when the channel is full the report is dropped, the
/// next one carries the newer cumulative count anyway.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: mpsc::Sender<TransferProgress>,
}

impl ProgressReporter {
    /// Creates a reporter and the receiver consuming its reports.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TransferProgress>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Reports cumulative progress.
    ///
    /// Returns false once nobody listens anymore, which executors may take as a
    /// hint to stop.
    pub fn report(&self, bytes_written: u64, bytes_expected: u64) -> bool {
        let progress = TransferProgress {
            bytes_written,
            bytes_expected,
        };
        match self.tx.try_send(progress) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Whether the receiving side is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Resumable download primitive driven by the scheduler.
#[async_trait]
pub trait TransferExecutor: Send + Sync + 'static {
    /// Runs one transfer attempt to completion.
    async fn start(
        &self,
        request: TransferRequest,
        progress: ProgressReporter,
    ) -> Result<TransferOutcome, TransferError>;

    /// Asks the executor to stop the transfer of `id`.
    ///
    /// Best effort: the scheduler logs failures and carries on.
    async fn pause(&self, id: DownloadId) -> Result<(), TransferError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_ok() {
        assert!(TransferOutcome::ok("/tmp/a").is_ok());
        let outcome = TransferOutcome {
            status: StatusCode::NOT_FOUND,
            final_path: PathBuf::from("/tmp/a"),
        };
        assert!(!outcome.is_ok());
    }

    #[tokio::test]
    async fn test_reporter_drops_when_full() {
        let (reporter, mut rx) = ProgressReporter::channel(1);
        assert!(reporter.report(1, 10));
        assert!(reporter.report(2, 10));
        assert_eq!(rx.recv().await.map(|p| p.bytes_written), Some(1));

        drop(rx);
        assert!(!reporter.report(3, 10));
        assert!(reporter.is_closed());
    }
}
