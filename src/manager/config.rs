//! Configuration structures and defaults for the download manager.
//!
//! [`ManagerConfig`] is stored together with the queue, so it is serializable.
//! Durations are kept in milliseconds to keep the persisted form readable.
//!
//! # Examples
//!
//! ```rust
//! use haul::manager::ManagerConfig;
//! use std::time::Duration;
//!
//! let config = ManagerConfig::default();
//! assert_eq!(config.max_concurrent_downloads, 3);
//! assert_eq!(config.progress_update_interval(), Duration::from_millis(1000));
//! ```

use crate::download::{DownloadItem, DEFAULT_MAX_RETRIES};

use serde::{Deserialize, Serialize};
use std::env::current_dir;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Key under which the manager state is persisted.
pub const DEFAULT_STORAGE_KEY: &str = "haul.downloads";

/// Default storage quota: 5 GiB.
pub const DEFAULT_MAX_STORAGE_USAGE: u64 = 5 * 1024 * 1024 * 1024;

/// Callback invoked when a download completes.
pub type CompletionCallback = Box<dyn Fn(&DownloadItem) + Send + Sync>;

/// Options of a [`DownloadManager`](super::DownloadManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagerConfig {
    /// Number of transfers allowed to run at once.
    pub max_concurrent_downloads: usize,
    /// Whether transfers may use metered connections.
    pub allow_mobile_data: bool,
    /// Advisory quota for the download directory, in bytes.
    pub max_storage_usage: u64,
    /// Directory downloads are saved to and measured against the quota.
    pub default_download_directory: PathBuf,
    /// Minimum time between two progress events of one download.
    pub progress_update_interval_ms: u64,
    /// Quiet period after the last mutation before the state is written.
    pub persist_debounce_ms: u64,
    /// Retry budget of downloads that do not set their own.
    pub default_max_retries: u32,
    /// Key of the persisted state.
    pub storage_key: String,
}

impl ManagerConfig {
    pub fn progress_update_interval(&self) -> Duration {
        Duration::from_millis(self.progress_update_interval_ms)
    }

    pub fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 3,
            allow_mobile_data: false,
            max_storage_usage: DEFAULT_MAX_STORAGE_USAGE,
            default_download_directory: current_dir().unwrap_or_default().join("downloads"),
            progress_update_interval_ms: 1000,
            persist_debounce_ms: 1000,
            default_max_retries: DEFAULT_MAX_RETRIES,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

/// Hooks called by the scheduler.
#[derive(Clone, Default)]
pub(crate) struct Hooks {
    pub on_complete: Option<Arc<CompletionCallback>>,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}
