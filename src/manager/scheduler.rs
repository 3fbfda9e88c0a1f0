//! The download queue scheduler.
//!
//! One [`Scheduler`] runs per manager, inside a task of its own. It exclusively
//! owns the item index, the pending queue and the active set, so none of them
//! needs a lock: commands from [`DownloadManager`](super::DownloadManager)
//! handles, transfer results, progress reports and the persistence timer are
//! all handled one at a time by [`Scheduler::run`].

use super::config::{Hooks, ManagerConfig};
use super::events::{DownloadEvent, QueueStats};
use crate::download::{DownloadId, DownloadItem, DownloadRequest, Status};
use crate::error::{Error, Result, TransferError};
use crate::persistence::{Debouncer, PersistedState, Persistence};
use crate::progress::ProgressTracker;
use crate::storage::{StorageGuard, StorageInfo};
use crate::transfer::{
    ProgressReporter, TransferExecutor, TransferOutcome, TransferProgress, TransferRequest,
    PROGRESS_CHANNEL_CAPACITY,
};

use reqwest::StatusCode;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{StreamExt, StreamMap};
use tracing::{debug, info, warn};

/// Requests sent by manager handles.
pub(crate) enum Command {
    Add {
        request: Box<DownloadRequest>,
        reply: oneshot::Sender<Result<DownloadId>>,
    },
    Pause {
        id: DownloadId,
        reply: oneshot::Sender<Result<()>>,
    },
    Resume {
        id: DownloadId,
        reply: oneshot::Sender<Result<()>>,
    },
    Cancel {
        id: DownloadId,
        reply: oneshot::Sender<Result<()>>,
    },
    Retry {
        id: DownloadId,
        reply: oneshot::Sender<Result<()>>,
    },
    Remove {
        id: DownloadId,
        delete_file: bool,
        reply: oneshot::Sender<Result<()>>,
    },
    Get {
        id: DownloadId,
        reply: oneshot::Sender<Option<DownloadItem>>,
    },
    List {
        reply: oneshot::Sender<Vec<DownloadItem>>,
    },
    Stats {
        reply: oneshot::Sender<QueueStats>,
    },
    ClearCompleted {
        reply: oneshot::Sender<usize>,
    },
    PauseAll {
        reply: oneshot::Sender<usize>,
    },
    ResumeAll {
        reply: oneshot::Sender<usize>,
    },
    SetMaxConcurrent {
        max: usize,
        reply: oneshot::Sender<()>,
    },
    StorageInfo {
        reply: oneshot::Sender<StorageInfo>,
    },
    Config {
        reply: oneshot::Sender<ManagerConfig>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Result of one transfer attempt, tagged with the attempt's generation.
struct TransferFinished {
    id: DownloadId,
    generation: u64,
    result: std::result::Result<TransferOutcome, TransferError>,
}

struct RunningTransfer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Collaborators handed to the scheduler by the builder.
pub(crate) struct Collaborators {
    pub executor: Arc<dyn TransferExecutor>,
    pub guard: StorageGuard,
    pub persistence: Persistence,
    pub hooks: Hooks,
}

pub(crate) struct Scheduler {
    config: ManagerConfig,
    items: HashMap<DownloadId, DownloadItem>,
    /// Ids in creation order.
    order: Vec<DownloadId>,
    queue: VecDeque<DownloadId>,
    /// Ids holding a concurrency slot, oldest first.
    active: Vec<DownloadId>,
    transfers: HashMap<DownloadId, RunningTransfer>,
    progress: StreamMap<DownloadId, ReceiverStream<TransferProgress>>,
    tracker: ProgressTracker,
    next_generation: u64,
    executor: Arc<dyn TransferExecutor>,
    guard: StorageGuard,
    persistence: Persistence,
    debouncer: Debouncer,
    hooks: Hooks,
    events: broadcast::Sender<DownloadEvent>,
    commands: mpsc::Receiver<Command>,
    finished_tx: mpsc::UnboundedSender<TransferFinished>,
    finished_rx: mpsc::UnboundedReceiver<TransferFinished>,
}

impl Scheduler {
    pub(crate) fn new(
        config: ManagerConfig,
        collaborators: Collaborators,
        events: broadcast::Sender<DownloadEvent>,
        commands: mpsc::Receiver<Command>,
    ) -> Self {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        Self {
            tracker: ProgressTracker::new(config.progress_update_interval()),
            debouncer: Debouncer::new(config.persist_debounce()),
            config,
            items: HashMap::new(),
            order: Vec::new(),
            queue: VecDeque::new(),
            active: Vec::new(),
            transfers: HashMap::new(),
            progress: StreamMap::new(),
            next_generation: 0,
            executor: collaborators.executor,
            guard: collaborators.guard,
            persistence: collaborators.persistence,
            hooks: collaborators.hooks,
            events,
            commands,
            finished_tx,
            finished_rx,
        }
    }

    /// Replaces the in-memory state with a recovered persisted state.
    ///
    /// The configuration the manager was built with wins over the persisted one.
    pub(crate) fn restore(&mut self, state: PersistedState) {
        for item in state.items {
            if self.items.contains_key(&item.id) {
                warn!("Ignoring duplicate persisted download {}", item.id);
                continue;
            }
            self.order.push(item.id);
            self.items.insert(item.id, item);
        }
        self.queue = state
            .queue
            .into_iter()
            .filter(|id| self.items.contains_key(id))
            .collect();
        self.active.clear();
        if state.config != self.config {
            debug!("Persisted configuration differs, using the configured one");
        }
        self.schedule_persist();
    }

    /// Runs until a shutdown command arrives or every handle is dropped.
    pub(crate) async fn run(mut self) {
        info!("Download manager started with {} downloads", self.items.len());
        self.process_queue();

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command).await {
                            break;
                        }
                    }
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
                Some(finished) = self.finished_rx.recv() => self.handle_finished(finished),
                Some((id, report)) = self.progress.next(), if !self.progress.is_empty() => {
                    self.handle_progress(id, report);
                }
                () = self.debouncer.elapsed() => {
                    self.debouncer.cancel();
                    self.persist().await;
                }
            }
        }
        info!("Download manager stopped");
    }

    /// Handles one command, returning false once the scheduler must stop.
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Add { request, reply } => {
                let _ = reply.send(self.add_download(*request).await);
            }
            Command::Pause { id, reply } => {
                let _ = reply.send(self.pause_download(id).await);
            }
            Command::Resume { id, reply } => {
                let _ = reply.send(self.resume_download(id));
            }
            Command::Cancel { id, reply } => {
                let _ = reply.send(self.cancel_download(id).await);
            }
            Command::Retry { id, reply } => {
                let _ = reply.send(self.retry_download(id).await);
            }
            Command::Remove {
                id,
                delete_file,
                reply,
            } => {
                let _ = reply.send(self.remove_download(id, delete_file).await);
            }
            Command::Get { id, reply } => {
                let _ = reply.send(self.items.get(&id).cloned());
            }
            Command::List { reply } => {
                let _ = reply.send(self.ordered_items().cloned().collect());
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            Command::ClearCompleted { reply } => {
                let _ = reply.send(self.clear_completed());
            }
            Command::PauseAll { reply } => {
                let _ = reply.send(self.pause_all().await);
            }
            Command::ResumeAll { reply } => {
                let _ = reply.send(self.resume_all());
            }
            Command::SetMaxConcurrent { max, reply } => {
                self.set_max_concurrent(max).await;
                let _ = reply.send(());
            }
            Command::StorageInfo { reply } => {
                let info = self
                    .guard
                    .info(
                        &self.config.default_download_directory,
                        self.config.max_storage_usage,
                    )
                    .await;
                let _ = reply.send(info);
            }
            Command::Config { reply } => {
                let _ = reply.send(self.config.clone());
            }
            Command::Shutdown { reply } => {
                self.shutdown().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    async fn add_download(&mut self, request: DownloadRequest) -> Result<DownloadId> {
        validate_destination(&request.transfer.destination_path).await?;

        let admission = self
            .guard
            .check(
                request.transfer.expected_size,
                &self.config.default_download_directory,
                self.config.max_storage_usage,
            )
            .await?;
        if let Some(warning) = admission.quota_warning {
            self.emit(DownloadEvent::StorageWarning {
                usage: warning.usage,
                limit: warning.limit,
            });
        }

        let max_retries = request
            .max_retries
            .unwrap_or(self.config.default_max_retries);
        let item = DownloadItem::new(request.source, request.content, request.transfer, max_retries);
        let id = item.id;
        info!("Queued download {} ({})", id, item.content.title);

        self.order.push(id);
        self.items.insert(id, item);
        self.queue.push_back(id);
        self.schedule_persist();
        self.emit_queue_updated();
        self.process_queue();
        Ok(id)
    }

    /// Starts queued items while a concurrency slot is free.
    fn process_queue(&mut self) {
        let queued = self.queue.len();
        while self.active.len() < self.config.max_concurrent_downloads {
            let Some(id) = self.queue.pop_front() else {
                break;
            };
            let startable = self
                .items
                .get(&id)
                .is_some_and(|item| item.status().is_startable());
            if !startable {
                debug!("Skipping queued download {} that is no longer startable", id);
                continue;
            }
            self.active.push(id);
            self.start_transfer(id);
        }
        if self.queue.len() != queued {
            self.emit_queue_updated();
        }
    }

    /// Hands `id` to the executor. The caller has reserved its slot.
    fn start_transfer(&mut self, id: DownloadId) {
        let Some(item) = self.items.get_mut(&id) else {
            return;
        };
        if !item.transition(Status::Downloading) {
            warn!("Cannot start download {} from status {}", id, item.status());
            self.active.retain(|active| *active != id);
            return;
        }

        let request = TransferRequest::for_item(item, self.config.allow_mobile_data);
        let (reporter, reports) = ProgressReporter::channel(PROGRESS_CHANNEL_CAPACITY);
        self.progress.insert(id, ReceiverStream::new(reports));
        self.tracker.begin(id, Instant::now());

        self.next_generation += 1;
        let generation = self.next_generation;
        let executor = Arc::clone(&self.executor);
        let finished = self.finished_tx.clone();
        let handle = tokio::spawn(async move {
            let result = executor.start(request, reporter).await;
            let _ = finished.send(TransferFinished {
                id,
                generation,
                result,
            });
        });
        if let Some(previous) = self
            .transfers
            .insert(id, RunningTransfer { generation, handle })
        {
            previous.handle.abort();
        }

        info!("Started download {}", id);
        self.schedule_persist();
    }

    async fn pause_download(&mut self, id: DownloadId) -> Result<()> {
        let status = self.status_of(id)?;
        if status != Status::Downloading {
            debug!("Not pausing download {} in status {}", id, status);
            return Ok(());
        }

        if let Err(e) = self.executor.pause(id).await {
            warn!("Executor failed to pause {}: {}", id, e);
        }
        self.stop_transfer(&id);
        self.release_slot(&id);
        if let Some(item) = self.items.get_mut(&id) {
            item.transition(Status::Paused);
            item.state.speed = 0.0;
            item.state.eta = 0.0;
        }

        info!("Paused download {}", id);
        self.emit(DownloadEvent::DownloadPaused { id });
        self.schedule_persist();
        self.process_queue();
        Ok(())
    }

    fn resume_download(&mut self, id: DownloadId) -> Result<()> {
        let status = self.status_of(id)?;
        if status != Status::Paused {
            debug!("Not resuming download {} in status {}", id, status);
            return Ok(());
        }

        if self.active.len() < self.config.max_concurrent_downloads {
            self.active.push(id);
            self.start_transfer(id);
            info!("Resumed download {}", id);
            self.emit(DownloadEvent::DownloadResumed { id });
        } else {
            if let Some(item) = self.items.get_mut(&id) {
                item.transition(Status::Pending);
            }
            self.queue.push_back(id);
            info!("Resumed download {} waits for a free slot", id);
            self.emit(DownloadEvent::DownloadResumed { id });
            self.emit_queue_updated();
        }
        self.schedule_persist();
        Ok(())
    }

    async fn cancel_download(&mut self, id: DownloadId) -> Result<()> {
        let status = self.status_of(id)?;
        if status.is_terminal() {
            debug!("Not cancelling download {} in status {}", id, status);
            return Ok(());
        }

        if status == Status::Downloading {
            if let Err(e) = self.executor.pause(id).await {
                warn!("Executor failed to stop {}: {}", id, e);
            }
            self.stop_transfer(&id);
        }
        let path = self.destination_of(id);
        remove_partial_file(&path).await;

        if let Some(item) = self.items.get_mut(&id) {
            item.transition(Status::Cancelled);
            item.state.speed = 0.0;
            item.state.eta = 0.0;
        }
        self.release_slot(&id);
        let queued = self.queue.len();
        self.queue.retain(|queued| *queued != id);

        info!("Cancelled download {}", id);
        self.emit(DownloadEvent::DownloadCancelled { id });
        if self.queue.len() != queued {
            self.emit_queue_updated();
        }
        self.schedule_persist();
        self.process_queue();
        Ok(())
    }

    async fn retry_download(&mut self, id: DownloadId) -> Result<()> {
        let item = self.items.get(&id).ok_or(Error::NotFound(id))?;
        if item.status() != Status::Failed {
            debug!("Not retrying download {} in status {}", id, item.status());
            return Ok(());
        }
        if !item.can_retry() {
            return Err(Error::RetryExhausted {
                id,
                attempts: item.state.retry_count,
            });
        }

        let path = item.transfer.destination_path.clone();
        remove_partial_file(&path).await;

        let Some(item) = self.items.get_mut(&id) else {
            return Err(Error::NotFound(id));
        };
        item.prepare_retry();
        let attempt = item.state.retry_count;
        self.queue.push_back(id);

        info!("Retrying download {} (attempt {})", id, attempt);
        self.emit(DownloadEvent::DownloadRetrying { id, attempt });
        self.emit_queue_updated();
        self.schedule_persist();
        self.process_queue();
        Ok(())
    }

    fn handle_finished(&mut self, finished: TransferFinished) {
        let TransferFinished {
            id,
            generation,
            result,
        } = finished;
        match self.transfers.get(&id) {
            Some(running) if running.generation == generation => {}
            _ => {
                debug!("Ignoring result of a stopped transfer of {}", id);
                return;
            }
        }
        self.transfers.remove(&id);

        match result {
            Ok(outcome) if outcome.is_ok() => self.handle_completed(id, outcome.final_path),
            Ok(outcome) => self.handle_failed(id, status_error(outcome.status)),
            Err(e) => self.handle_failed(id, e),
        }
    }

    fn handle_completed(&mut self, id: DownloadId, final_path: PathBuf) {
        self.progress.remove(&id);
        self.tracker.forget(&id);
        self.release_slot(&id);

        let Some(item) = self.items.get_mut(&id) else {
            return;
        };
        if !item.complete() {
            warn!("Ignoring completion of download {} in status {}", id, item.status());
            return;
        }

        info!("Completed download {} at {:?}", id, final_path);
        self.schedule_persist();
        if let (Some(callback), Some(item)) = (&self.hooks.on_complete, self.items.get(&id)) {
            callback(item);
        }
        self.emit(DownloadEvent::DownloadCompleted {
            id,
            local_path: final_path,
        });
        self.process_queue();
    }

    fn handle_failed(&mut self, id: DownloadId, error: TransferError) {
        let Some(status) = self.items.get(&id).map(|item| item.status()) else {
            return;
        };
        if status == Status::Paused {
            debug!("Suppressing failure of paused download {}: {}", id, error);
            return;
        }
        if status != Status::Downloading {
            debug!("Ignoring failure of download {} in status {}", id, status);
            return;
        }

        self.progress.remove(&id);
        self.tracker.forget(&id);
        self.release_slot(&id);

        let message = error.to_string();
        let Some(item) = self.items.get_mut(&id) else {
            return;
        };
        item.fail(message.clone());
        let can_retry = item.can_retry();

        warn!("Download {} failed: {}", id, message);
        self.emit(DownloadEvent::DownloadFailed {
            id,
            error: message,
            can_retry,
        });
        self.schedule_persist();
        self.process_queue();
    }

    fn handle_progress(&mut self, id: DownloadId, report: TransferProgress) {
        let Some(item) = self.items.get_mut(&id) else {
            return;
        };
        if item.status() != Status::Downloading {
            return;
        }
        let Some(update) = self.tracker.observe(item, report, Instant::now()) else {
            return;
        };
        item.record_progress(
            update.bytes_written,
            update.bytes_expected,
            update.speed,
            update.eta,
        );
        let event = DownloadEvent::progress(item);
        self.emit(event);
    }

    async fn remove_download(&mut self, id: DownloadId, delete_file: bool) -> Result<()> {
        let status = self.status_of(id)?;
        if !matches!(
            status,
            Status::Completed | Status::Cancelled | Status::Failed
        ) {
            self.cancel_download(id).await?;
        }

        let Some(item) = self.items.remove(&id) else {
            return Err(Error::NotFound(id));
        };
        self.order.retain(|known| *known != id);
        self.queue.retain(|queued| *queued != id);
        if delete_file {
            remove_partial_file(&item.transfer.destination_path).await;
        }

        info!("Removed download {}", id);
        self.schedule_persist();
        Ok(())
    }

    fn clear_completed(&mut self) -> usize {
        let completed: Vec<DownloadId> = self
            .ordered_items()
            .filter(|item| item.status() == Status::Completed)
            .map(|item| item.id)
            .collect();
        for id in &completed {
            self.items.remove(id);
        }
        self.order.retain(|id| self.items.contains_key(id));

        if !completed.is_empty() {
            info!("Cleared {} completed downloads", completed.len());
            self.schedule_persist();
        }
        completed.len()
    }

    async fn pause_all(&mut self) -> usize {
        let downloading = self.active.clone();
        let mut paused = 0;
        for id in downloading {
            if self.status_of(id).ok() == Some(Status::Downloading)
                && self.pause_download(id).await.is_ok()
            {
                paused += 1;
            }
        }
        paused
    }

    fn resume_all(&mut self) -> usize {
        let paused: Vec<DownloadId> = self
            .ordered_items()
            .filter(|item| item.status() == Status::Paused)
            .map(|item| item.id)
            .collect();
        let mut resumed = 0;
        for id in paused {
            if self.resume_download(id).is_ok() {
                resumed += 1;
            }
        }
        resumed
    }

    /// Changes the concurrency limit.
    ///
    /// Transfers above a lowered limit are stopped and put back at the front
    /// of the queue, most recently started last.
    async fn set_max_concurrent(&mut self, max: usize) {
        let max = max.max(1);
        info!("Concurrency limit set to {}", max);
        self.config.max_concurrent_downloads = max;

        let mut requeued = false;
        while self.active.len() > max {
            let Some(id) = self.active.pop() else {
                break;
            };
            if let Err(e) = self.executor.pause(id).await {
                warn!("Executor failed to pause {}: {}", id, e);
            }
            self.stop_transfer(&id);
            if let Some(item) = self.items.get_mut(&id) {
                item.transition(Status::Paused);
                item.transition(Status::Pending);
                item.state.speed = 0.0;
                item.state.eta = 0.0;
            }
            self.queue.push_front(id);
            requeued = true;
        }
        if requeued {
            self.emit_queue_updated();
        }
        self.schedule_persist();
        self.process_queue();
    }

    fn stats(&self) -> QueueStats {
        let mut stats = QueueStats::default();
        for item in self.items.values() {
            stats.count(item.status());
        }
        stats.queued = self.queue.len();
        stats.active = self.active.len();
        stats
    }

    async fn shutdown(&mut self) {
        for (id, transfer) in self.transfers.drain() {
            debug!("Aborting transfer of {}", id);
            transfer.handle.abort();
        }
        self.debouncer.cancel();
        self.persist().await;
    }

    fn stop_transfer(&mut self, id: &DownloadId) {
        if let Some(transfer) = self.transfers.remove(id) {
            transfer.handle.abort();
        }
        self.progress.remove(id);
        self.tracker.forget(id);
    }

    fn release_slot(&mut self, id: &DownloadId) {
        self.active.retain(|active| active != id);
    }

    fn status_of(&self, id: DownloadId) -> Result<Status> {
        self.items
            .get(&id)
            .map(|item| item.status())
            .ok_or(Error::NotFound(id))
    }

    fn destination_of(&self, id: DownloadId) -> PathBuf {
        self.items
            .get(&id)
            .map(|item| item.transfer.destination_path.clone())
            .unwrap_or_default()
    }

    fn ordered_items(&self) -> impl Iterator<Item = &DownloadItem> {
        self.order.iter().filter_map(|id| self.items.get(id))
    }

    fn snapshot(&self) -> PersistedState {
        PersistedState::new(
            self.ordered_items().cloned().collect(),
            self.queue.iter().copied().collect(),
            self.active.clone(),
            self.config.clone(),
        )
    }

    fn schedule_persist(&mut self) {
        self.debouncer.schedule();
    }

    async fn persist(&self) {
        let state = self.snapshot();
        self.persistence.save(&state).await;
    }

    fn emit(&self, event: DownloadEvent) {
        // Sending only fails without subscribers.
        let _ = self.events.send(event);
    }

    fn emit_queue_updated(&self) {
        self.emit(DownloadEvent::QueueUpdated {
            queue_size: self.queue.len(),
        });
    }
}

/// Checks that `path` names a file whose directory exists or can be created.
async fn validate_destination(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::Validation("destination path is empty".to_string()));
    }
    if path.file_name().is_none() {
        return Err(Error::Validation(format!("{:?} does not name a file", path)));
    }
    if fs::metadata(path).await.is_ok_and(|m| m.is_dir()) {
        return Err(Error::Validation(format!("{:?} is a directory", path)));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(|e| {
            Error::Validation(format!("cannot create directory {:?}: {}", parent, e))
        })?;
    }
    Ok(())
}

/// Deletes `path`, logging anything but its absence.
async fn remove_partial_file(path: &Path) {
    if path.as_os_str().is_empty() {
        return;
    }
    match fs::remove_file(path).await {
        Ok(()) => debug!("Removed {:?}", path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {:?}: {}", path, e),
    }
}

/// Maps an unsuccessful response status to a transfer error.
fn status_error(status: StatusCode) -> TransferError {
    let message = format!("server responded with {}", status);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TransferError::permission(message),
        StatusCode::INSUFFICIENT_STORAGE => TransferError::storage(message),
        _ => TransferError::network(message),
    }
}
