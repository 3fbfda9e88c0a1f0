//! Serialized manager state and its recovery after a restart.

use super::store::KeyValueStore;
use crate::download::{DownloadId, DownloadItem, Status};
use crate::error::Error;
use crate::manager::ManagerConfig;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Format version written with every state.
pub const STATE_VERSION: u32 = 1;

/// Everything the manager persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub version: u32,
    /// Items in creation order.
    pub items: Vec<DownloadItem>,
    /// Pending queue, front first.
    pub queue: Vec<DownloadId>,
    /// Ids holding a concurrency slot when the state was written.
    pub active: Vec<DownloadId>,
    pub config: ManagerConfig,
}

/// What the recovery pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Interrupted downloads demoted to paused.
    pub paused: Vec<DownloadId>,
    /// Completed downloads whose file vanished, demoted to failed.
    pub missing: Vec<DownloadId>,
    /// Queue entries dropped or appended to make the queue consistent.
    pub queue_repairs: usize,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.paused.is_empty() && self.missing.is_empty() && self.queue_repairs == 0
    }
}

impl PersistedState {
    pub fn new(
        items: Vec<DownloadItem>,
        queue: Vec<DownloadId>,
        active: Vec<DownloadId>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            version: STATE_VERSION,
            items,
            queue,
            active,
            config,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Makes restored state consistent with a process that runs no transfer.
    ///
    /// - downloading items become paused, since their transfers died with the
    ///   previous process
    /// - completed items whose file is gone become failed
    /// - the active set is emptied
    /// - the queue keeps each startable item exactly once, and startable items
    ///   missing from it are appended in creation order
    pub fn recover(&mut self) -> RecoveryReport {
        let mut report = RecoveryReport::default();

        for item in self.items.iter_mut() {
            match item.status() {
                Status::Downloading => {
                    item.transition(Status::Paused);
                    item.state.speed = 0.0;
                    item.state.eta = 0.0;
                    report.paused.push(item.id);
                }
                Status::Completed if !file_exists(&item.transfer.destination_path) => {
                    item.mark_file_missing();
                    report.missing.push(item.id);
                }
                _ => {}
            }
        }
        self.active.clear();

        let startable: HashSet<DownloadId> = self
            .items
            .iter()
            .filter(|item| item.status().is_startable())
            .map(|item| item.id)
            .collect();

        let before = self.queue.len();
        let mut seen = HashSet::new();
        self.queue
            .retain(|id| startable.contains(id) && seen.insert(*id));
        report.queue_repairs += before - self.queue.len();

        for item in &self.items {
            if startable.contains(&item.id) && !seen.contains(&item.id) {
                self.queue.push(item.id);
                report.queue_repairs += 1;
            }
        }

        report
    }
}

fn file_exists(path: &Path) -> bool {
    path.try_exists().unwrap_or(false)
}

/// Reads and writes [`PersistedState`] under one key of a [`KeyValueStore`].
///
/// Failures never propagate: persistence is best effort, the manager keeps
/// running on its in-memory state.
#[derive(Clone)]
pub struct Persistence {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl Persistence {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Loads and recovers the stored state.
    ///
    /// Returns `None` when nothing is stored, or when the stored value cannot
    /// be read or decoded. An undecodable value is removed.
    pub async fn load(&self) -> Option<(PersistedState, RecoveryReport)> {
        let bytes = match self.store.get(&self.key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!("No persisted state under {}", self.key);
                return None;
            }
            Err(e) => {
                warn!("Could not read persisted state: {}", e);
                return None;
            }
        };

        let mut state = match PersistedState::from_bytes(&bytes) {
            Ok(state) => state,
            Err(e) => {
                warn!("Discarding corrupt persisted state: {}", e);
                if let Err(e) = self.store.remove(&self.key).await {
                    warn!("Could not remove corrupt state: {}", e);
                }
                return None;
            }
        };

        let report = state.recover();
        info!(
            "Restored {} downloads ({} paused, {} missing files)",
            state.items.len(),
            report.paused.len(),
            report.missing.len()
        );
        Some((state, report))
    }

    /// Writes `state`, logging failures.
    pub async fn save(&self, state: &PersistedState) -> bool {
        let bytes = match state.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Could not encode manager state: {}", e);
                return false;
            }
        };
        match self.store.set(&self.key, bytes).await {
            Ok(()) => {
                debug!("Persisted {} downloads", state.items.len());
                true
            }
            Err(e) => {
                warn!("Could not persist manager state: {}", e);
                false
            }
        }
    }
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
