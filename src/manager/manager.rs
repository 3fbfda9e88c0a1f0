//! The download manager handle.

use super::builder::DownloadManagerBuilder;
use super::config::ManagerConfig;
use super::events::{DownloadEvent, QueueStats};
use super::scheduler::Command;
use crate::download::{DownloadId, DownloadItem, DownloadRequest};
use crate::error::{Error, Result};
use crate::storage::StorageInfo;

use tokio::sync::{broadcast, mpsc, oneshot};

/// Cloneable handle to a running download queue.
///
/// Every method sends a command to the scheduler task and waits for its
/// answer, so operations from all clones are applied one after the other.
/// Once the manager is shut down every method fails with [`Error::Internal`].
///
/// ```rust,no_run
/// use haul::download::{ContentInfo, DownloadRequest, SourceRef};
/// use haul::manager::{DownloadEvent, DownloadManager};
///
/// # async fn example() -> Result<(), haul::Error> {
/// let manager = DownloadManager::builder().build().await?;
/// let mut events = manager.subscribe();
///
/// let request = DownloadRequest::from_url(
///     "https://example.com/trailer.mp4",
///     "./downloads",
///     SourceRef::new("svc-1", "radarr"),
///     ContentInfo::new("Trailer", "movie"),
/// )?;
/// let id = manager.add_download(request).await?;
///
/// while let Ok(event) = events.recv().await {
///     if let DownloadEvent::DownloadCompleted { id: done, .. } = event {
///         if done == id {
///             break;
///         }
///     }
/// }
/// manager.shutdown().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DownloadManager {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<DownloadEvent>,
}

impl DownloadManager {
    pub(crate) fn new(
        commands: mpsc::Sender<Command>,
        events: broadcast::Sender<DownloadEvent>,
    ) -> Self {
        Self { commands, events }
    }

    /// Creates a builder with the default options.
    pub fn builder() -> DownloadManagerBuilder {
        DownloadManagerBuilder::new()
    }

    /// Subscribes to lifecycle events.
    ///
    /// Only events emitted after the call are received.
    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.events.subscribe()
    }

    /// Admits a download and queues it.
    ///
    /// Fails with [`Error::Validation`] when the destination is unusable and
    /// with [`Error::InsufficientStorage`] when it does not fit on the device.
    /// No item is created in either case.
    pub async fn add_download(&self, request: DownloadRequest) -> Result<DownloadId> {
        let request = Box::new(request);
        self.request(|reply| Command::Add { request, reply }).await?
    }

    /// Pauses a running download. Does nothing unless it is downloading.
    pub async fn pause_download(&self, id: DownloadId) -> Result<()> {
        self.request(|reply| Command::Pause { id, reply }).await?
    }

    /// Resumes a paused download. Does nothing unless it is paused.
    ///
    /// When every slot is taken the download waits at the back of the queue.
    pub async fn resume_download(&self, id: DownloadId) -> Result<()> {
        self.request(|reply| Command::Resume { id, reply }).await?
    }

    /// Cancels a download that has not reached a terminal state and deletes
    /// its partial file.
    pub async fn cancel_download(&self, id: DownloadId) -> Result<()> {
        self.request(|reply| Command::Cancel { id, reply }).await?
    }

    /// Queues a failed download again.
    ///
    /// Fails with [`Error::RetryExhausted`] once its retry budget is used up.
    pub async fn retry_download(&self, id: DownloadId) -> Result<()> {
        self.request(|reply| Command::Retry { id, reply }).await?
    }

    /// Forgets a download, cancelling it first when it is still live.
    pub async fn remove_download(&self, id: DownloadId, delete_file: bool) -> Result<()> {
        self.request(|reply| Command::Remove {
            id,
            delete_file,
            reply,
        })
        .await?
    }

    pub async fn get_download(&self, id: DownloadId) -> Result<Option<DownloadItem>> {
        self.request(|reply| Command::Get { id, reply }).await
    }

    /// Every tracked download in creation order.
    pub async fn downloads(&self) -> Result<Vec<DownloadItem>> {
        self.request(|reply| Command::List { reply }).await
    }

    pub async fn queue_stats(&self) -> Result<QueueStats> {
        self.request(|reply| Command::Stats { reply }).await
    }

    /// Removes completed downloads from the index, leaving their files on disk.
    pub async fn clear_completed(&self) -> Result<usize> {
        self.request(|reply| Command::ClearCompleted { reply }).await
    }

    /// Pauses every running download, returning how many were paused.
    pub async fn pause_all(&self) -> Result<usize> {
        self.request(|reply| Command::PauseAll { reply }).await
    }

    /// Resumes every paused download, returning how many were resumed.
    pub async fn resume_all(&self) -> Result<usize> {
        self.request(|reply| Command::ResumeAll { reply }).await
    }

    /// Changes the concurrency limit; values below 1 are raised to 1.
    pub async fn set_max_concurrent_downloads(&self, max: usize) -> Result<()> {
        self.request(|reply| Command::SetMaxConcurrent { max, reply })
            .await
    }

    pub async fn storage_info(&self) -> Result<StorageInfo> {
        self.request(|reply| Command::StorageInfo { reply }).await
    }

    /// The configuration in effect.
    pub async fn config(&self) -> Result<ManagerConfig> {
        self.request(|reply| Command::Config { reply }).await
    }

    /// Stops running transfers, writes the state and stops the scheduler.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| Error::Internal("download manager is not running".to_string()))?;
        response
            .await
            .map_err(|_| Error::Internal("download manager stopped before replying".to_string()))
    }
}
