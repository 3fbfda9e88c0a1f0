#![allow(dead_code)]

use async_trait::async_trait;
use haul::download::{ContentInfo, DownloadId, DownloadItem, DownloadRequest, SourceRef, Status};
use haul::manager::{DownloadEvent, DownloadManager, DownloadManagerBuilder};
use haul::persistence::MemoryStore;
use haul::storage::StorageProvider;
use haul::transfer::{ProgressReporter, TransferExecutor, TransferOutcome, TransferRequest};
use haul::TransferError;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{broadcast, oneshot};

// Common test constants
pub const MIB: u64 = 1024 * 1024;
pub const GIB: u64 = 1024 * MIB;
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Installs a tracing subscriber honouring `RUST_LOG`, once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Creates a temporary directory for testing purposes
pub fn create_temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temporary directory")
}

/// Creates a temporary file with the given content
pub fn create_temp_file(dir: &Path, filename: &str, content: &[u8]) -> PathBuf {
    let file_path = dir.join(filename);
    fs::write(&file_path, content).expect("Failed to write temporary file");
    file_path
}

/// Creates a test URL for download testing
pub fn create_test_url(filename: &str) -> String {
    format!("https://example.com/{}", filename)
}

/// Creates a download request saving `filename` under `dir`.
pub fn create_test_request(dir: &Path, filename: &str, size: u64) -> DownloadRequest {
    let mut content = ContentInfo::new(filename, "movie");
    content.size_hint = Some(size);
    DownloadRequest::from_url(
        &create_test_url(filename),
        dir,
        SourceRef::new("svc-1", "radarr"),
        content,
    )
    .expect("Failed to create download request")
}

// === Mock Collaborators ===

/// How a [`MockExecutor`] ends the transfers it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Transfers run until the test completes or fails them.
    Manual,
    /// Transfers write a small file and succeed immediately.
    Complete,
    /// Transfers fail immediately with a network error.
    Fail,
}

struct Live {
    reporter: ProgressReporter,
    destination: PathBuf,
    finish: oneshot::Sender<Result<TransferOutcome, TransferError>>,
}

#[derive(Default)]
struct State {
    started: Vec<TransferRequest>,
    paused: Vec<DownloadId>,
    live: HashMap<DownloadId, Live>,
}

/// Scripted transfer executor.
#[derive(Clone)]
pub struct MockExecutor {
    mode: Mode,
    state: Arc<Mutex<State>>,
}

impl MockExecutor {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    pub fn manual() -> Self {
        Self::new(Mode::Manual)
    }

    /// Every request received so far, in order.
    pub fn started(&self) -> Vec<TransferRequest> {
        self.state.lock().unwrap().started.clone()
    }

    pub fn started_ids(&self) -> Vec<DownloadId> {
        self.started().into_iter().map(|request| request.id).collect()
    }

    pub fn paused(&self) -> Vec<DownloadId> {
        self.state.lock().unwrap().paused.clone()
    }

    /// Ids whose transfer future is still alive.
    pub fn running(&self) -> HashSet<DownloadId> {
        self.state
            .lock()
            .unwrap()
            .live
            .iter()
            .filter(|(_, live)| !live.finish.is_closed())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Reports progress for a running transfer.
    pub fn report(&self, id: DownloadId, written: u64, expected: u64) -> bool {
        let state = self.state.lock().unwrap();
        let live = state.live.get(&id).expect("transfer is not running");
        live.reporter.report(written, expected)
    }

    /// Writes the destination file and finishes the transfer successfully.
    pub fn complete(&self, id: DownloadId) {
        let live = self.take(id);
        if let Some(parent) = live.destination.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&live.destination, b"complete").unwrap();
        let _ = live.finish.send(Ok(TransferOutcome::ok(live.destination)));
    }

    pub fn fail(&self, id: DownloadId, error: TransferError) {
        let live = self.take(id);
        let _ = live.finish.send(Err(error));
    }

    fn take(&self, id: DownloadId) -> Live {
        self.state
            .lock()
            .unwrap()
            .live
            .remove(&id)
            .expect("transfer is not running")
    }
}

#[async_trait]
impl TransferExecutor for MockExecutor {
    async fn start(
        &self,
        request: TransferRequest,
        progress: ProgressReporter,
    ) -> Result<TransferOutcome, TransferError> {
        let id = request.id;
        let destination = request.destination_path.clone();
        self.state.lock().unwrap().started.push(request);

        match self.mode {
            Mode::Complete => {
                if let Some(parent) = destination.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&destination, b"complete").await?;
                progress.report(8, 8);
                Ok(TransferOutcome::ok(destination))
            }
            Mode::Fail => Err(TransferError::network("connection reset by peer")),
            Mode::Manual => {
                let (finish, outcome) = oneshot::channel();
                self.state.lock().unwrap().live.insert(
                    id,
                    Live {
                        reporter: progress,
                        destination,
                        finish,
                    },
                );
                outcome
                    .await
                    .unwrap_or_else(|_| Err(TransferError::unknown("transfer dropped")))
            }
        }
    }

    async fn pause(&self, id: DownloadId) -> Result<(), TransferError> {
        self.state.lock().unwrap().paused.push(id);
        Ok(())
    }
}

/// Storage provider answering with fixed numbers.
#[derive(Debug, Clone, Copy)]
pub struct FixedStorage {
    pub free: u64,
    pub usage: u64,
}

impl FixedStorage {
    pub fn plenty() -> Self {
        Self {
            free: 100 * GIB,
            usage: 0,
        }
    }
}

#[async_trait]
impl StorageProvider for FixedStorage {
    async fn free_space(&self) -> io::Result<u64> {
        Ok(self.free)
    }

    async fn directory_usage(&self, _path: &Path) -> io::Result<u64> {
        Ok(self.usage)
    }
}

// === Manager Helpers ===

/// Creates a builder wired to test collaborators.
pub fn create_test_builder(
    executor: &MockExecutor,
    store: &MemoryStore,
    dir: &Path,
    max_concurrent: usize,
) -> DownloadManagerBuilder {
    DownloadManagerBuilder::new()
        .download_directory(dir.to_path_buf())
        .max_concurrent_downloads(max_concurrent)
        .persist_debounce(Duration::from_millis(10))
        .executor(executor.clone())
        .storage(FixedStorage::plenty())
        .store(store.clone())
}

/// Creates a running manager with plenty of storage and an in-memory store.
pub async fn create_test_manager(
    executor: &MockExecutor,
    dir: &Path,
    max_concurrent: usize,
) -> DownloadManager {
    init_tracing();
    create_test_builder(executor, &MemoryStore::new(), dir, max_concurrent)
        .build()
        .await
        .expect("Failed to build manager")
}

/// Adds `count` downloads named `file-<n>.bin`, returning their ids in order.
pub async fn add_test_downloads(
    manager: &DownloadManager,
    dir: &Path,
    count: usize,
) -> Vec<DownloadId> {
    let mut ids = Vec::with_capacity(count);
    for n in 1..=count {
        let request = create_test_request(dir, &format!("file-{}.bin", n), MIB);
        ids.push(manager.add_download(request).await.expect("Failed to add download"));
    }
    ids
}

pub async fn get_item(manager: &DownloadManager, id: DownloadId) -> DownloadItem {
    manager
        .get_download(id)
        .await
        .expect("manager stopped")
        .expect("download not found")
}

pub async fn status_of(manager: &DownloadManager, id: DownloadId) -> Status {
    get_item(manager, id).await.status()
}

/// Polls the manager until `predicate` holds for the item.
pub async fn wait_for_item<F>(manager: &DownloadManager, id: DownloadId, predicate: F) -> DownloadItem
where
    F: Fn(&DownloadItem) -> bool,
{
    let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
    loop {
        let item = get_item(manager, id).await;
        if predicate(&item) {
            return item;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting on {}: {:?}",
            id,
            item.state
        );
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

pub async fn wait_for_status(
    manager: &DownloadManager,
    id: DownloadId,
    status: Status,
) -> DownloadItem {
    wait_for_item(manager, id, |item| item.status() == status).await
}

/// Polls until the executor holds a live transfer for `id`.
pub async fn wait_for_running(executor: &MockExecutor, id: DownloadId) {
    let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
    while !executor.running().contains(&id) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for transfer {}",
            id
        );
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Polls until the executor received at least `count` requests.
pub async fn wait_for_starts(executor: &MockExecutor, count: usize) {
    let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
    while executor.started().len() < count {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {} transfers",
            count
        );
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Collects the events received so far.
pub fn drain_events(events: &mut broadcast::Receiver<DownloadEvent>) -> Vec<DownloadEvent> {
    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    received
}

// === Assertion Helpers ===

/// Asserts that a file exists at the given path
pub fn assert_file_exists(path: &Path) {
    assert!(path.exists(), "File should exist at path: {:?}", path);
}
