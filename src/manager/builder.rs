//! Builder pattern implementation for creating DownloadManager instances.
//!
//! [`DownloadManagerBuilder`] collects the options and collaborators of a
//! manager. [`build`](DownloadManagerBuilder::build) restores the persisted
//! state and spawns the scheduler task, so it must run inside a tokio runtime.
//!
//! # Examples
//!
//! ```rust,no_run
//! use haul::manager::DownloadManagerBuilder;
//! use haul::persistence::FileStore;
//! use haul::storage::DiskStorage;
//!
//! # async fn example() -> Result<(), haul::Error> {
//! let manager = DownloadManagerBuilder::new()
//!     .download_directory("./downloads".into())
//!     .max_concurrent_downloads(2)
//!     .storage(DiskStorage::new("./downloads"))
//!     .store(FileStore::new("./state"))
//!     .on_complete(|item| println!("Finished {}", item.content.title))
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use super::config::{CompletionCallback, Hooks, ManagerConfig};
use super::events::EVENT_CHANNEL_CAPACITY;
use super::manager::DownloadManager;
use super::scheduler::{Collaborators, Scheduler};
use crate::download::DownloadItem;
use crate::error::Error;
use crate::persistence::{KeyValueStore, MemoryStore, Persistence};
use crate::storage::{DiskStorage, StorageGuard, StorageProvider};
use crate::transfer::{HttpClientConfig, HttpExecutor, TransferExecutor};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// A builder used to create a [`DownloadManager`].
///
/// Collaborators left unset default to an [`HttpExecutor`], a [`DiskStorage`]
/// of the download directory and a [`MemoryStore`].
#[derive(Default)]
pub struct DownloadManagerBuilder {
    config: ManagerConfig,
    hooks: Hooks,
    executor: Option<Arc<dyn TransferExecutor>>,
    storage: Option<Arc<dyn StorageProvider>>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl DownloadManagerBuilder {
    /// Creates a builder with the default options.
    pub fn new() -> Self {
        DownloadManagerBuilder::default()
    }

    /// Replaces every option at once.
    ///
    /// A concurrency limit of 0 is raised to 1.
    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = ManagerConfig {
            max_concurrent_downloads: config.max_concurrent_downloads.max(1),
            ..config
        };
        self
    }

    /// Set the number of concurrent downloads.
    pub fn max_concurrent_downloads(mut self, max: usize) -> Self {
        self.config.max_concurrent_downloads = max.max(1);
        self
    }

    /// Allow transfers over metered connections.
    pub fn allow_mobile_data(mut self, allow: bool) -> Self {
        self.config.allow_mobile_data = allow;
        self
    }

    /// Sets the advisory storage quota in bytes.
    pub fn max_storage_usage(mut self, bytes: u64) -> Self {
        self.config.max_storage_usage = bytes;
        self
    }

    /// Sets the directory where downloads are stored.
    pub fn download_directory(mut self, directory: PathBuf) -> Self {
        self.config.default_download_directory = directory;
        self
    }

    /// Set the minimum time between two progress events of a download.
    pub fn progress_update_interval(mut self, interval: Duration) -> Self {
        self.config.progress_update_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the quiet period before the state is written.
    pub fn persist_debounce(mut self, delay: Duration) -> Self {
        self.config.persist_debounce_ms = delay.as_millis() as u64;
        self
    }

    /// Set the number of retries per download.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.default_max_retries = retries;
        self
    }

    /// Sets the key the state is persisted under.
    pub fn storage_key(mut self, key: impl Into<String>) -> Self {
        self.config.storage_key = key.into();
        self
    }

    /// Set callback for when each download completes.
    ///
    /// The callback runs on the scheduler task: keep it short.
    ///
    /// ```rust
    /// use haul::manager::DownloadManagerBuilder;
    ///
    /// let builder = DownloadManagerBuilder::new().on_complete(|item| {
    ///     println!("[Done] {} saved to {:?}", item.content.title, item.transfer.destination_path);
    /// });
    /// ```
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(&DownloadItem) + Send + Sync + 'static,
    {
        let callback: CompletionCallback = Box::new(callback);
        self.hooks.on_complete = Some(Arc::new(callback));
        self
    }

    /// Sets the transfer executor.
    pub fn executor<E: TransferExecutor>(mut self, executor: E) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    /// Sets the filesystem statistics provider.
    pub fn storage<S: StorageProvider>(mut self, storage: S) -> Self {
        self.storage = Some(Arc::new(storage));
        self
    }

    /// Sets the key-value store the state is persisted to.
    pub fn store<K: KeyValueStore>(mut self, store: K) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Restores the persisted state and starts the manager.
    pub async fn build(self) -> Result<DownloadManager, Error> {
        let config = self.config;
        let executor: Arc<dyn TransferExecutor> = match self.executor {
            Some(executor) => executor,
            None => Arc::new(HttpExecutor::new(HttpClientConfig::default())?),
        };
        let storage: Arc<dyn StorageProvider> = match self.storage {
            Some(storage) => storage,
            None => Arc::new(DiskStorage::new(&config.default_download_directory)),
        };
        let store: Arc<dyn KeyValueStore> = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryStore::new()),
        };
        let persistence = Persistence::new(store, config.storage_key.clone());
        let restored = persistence.load().await;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (commands, receiver) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let collaborators = Collaborators {
            executor,
            guard: StorageGuard::new(storage),
            persistence,
            hooks: self.hooks,
        };
        let mut scheduler = Scheduler::new(config, collaborators, events.clone(), receiver);
        if let Some((state, report)) = restored {
            debug!("Recovery report: {:?}", report);
            scheduler.restore(state);
        }

        tokio::spawn(scheduler.run());
        Ok(DownloadManager::new(commands, events))
    }
}

impl std::fmt::Debug for DownloadManagerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadManagerBuilder")
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .field("executor", &self.executor.is_some())
            .field("storage", &self.storage.is_some())
            .field("store", &self.store.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_setters() {
        let builder = DownloadManagerBuilder::new()
            .max_concurrent_downloads(0)
            .allow_mobile_data(true)
            .max_storage_usage(42)
            .download_directory(PathBuf::from("/srv/media"))
            .progress_update_interval(Duration::from_millis(250))
            .persist_debounce(Duration::from_millis(10))
            .max_retries(5)
            .storage_key("custom");

        assert_eq!(builder.config.max_concurrent_downloads, 1);
        assert!(builder.config.allow_mobile_data);
        assert_eq!(builder.config.max_storage_usage, 42);
        assert_eq!(
            builder.config.default_download_directory,
            PathBuf::from("/srv/media")
        );
        assert_eq!(builder.config.progress_update_interval_ms, 250);
        assert_eq!(builder.config.persist_debounce_ms, 10);
        assert_eq!(builder.config.default_max_retries, 5);
        assert_eq!(builder.config.storage_key, "custom");
    }

    #[test]
    fn test_config_clamps_concurrency() {
        let config = ManagerConfig {
            max_concurrent_downloads: 0,
            max_storage_usage: 7,
            ..ManagerConfig::default()
        };
        let builder = DownloadManagerBuilder::new().config(config);

        assert_eq!(builder.config.max_concurrent_downloads, 1);
        assert_eq!(builder.config.max_storage_usage, 7);
    }

    #[test]
    fn test_on_complete_is_registered() {
        let builder = DownloadManagerBuilder::new().on_complete(|_| {});
        assert!(builder.hooks.on_complete.is_some());
    }
}
