//! The download queue manager.
//!
//! A [`DownloadManager`] is a cheap, cloneable handle to a scheduler task
//! which owns every download, the pending queue and the active set. The
//! scheduler admits downloads through the storage guard, starts at most
//! [`ManagerConfig::max_concurrent_downloads`] transfers at once, throttles
//! their progress, persists its state and publishes a [`DownloadEvent`] for
//! every lifecycle change.
//!
//! - [`builder`] - [`DownloadManagerBuilder`]
//! - [`config`] - [`ManagerConfig`] and its defaults
//! - [`events`] - [`DownloadEvent`] and [`QueueStats`]
//! - [`manager`] - the [`DownloadManager`] handle

pub mod builder;
pub mod config;
pub mod events;
pub mod manager;
mod scheduler;

pub use builder::DownloadManagerBuilder;
pub use config::{CompletionCallback, ManagerConfig, DEFAULT_MAX_STORAGE_USAGE, DEFAULT_STORAGE_KEY};
pub use events::{DownloadEvent, QueueStats, EVENT_CHANNEL_CAPACITY};
pub use manager::DownloadManager;
