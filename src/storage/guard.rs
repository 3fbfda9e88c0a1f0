//! Admission checks against free space and the storage quota.

use super::provider::StorageProvider;
use crate::error::Error;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Free space assumed when the provider cannot answer.
pub const FALLBACK_FREE_SPACE: u64 = GIB;

/// Space reserved for a download whose size is unknown.
pub const DEFAULT_REQUIRED_SIZE: u64 = 100 * MIB;

/// Admission logs a warning below `required × SAFETY_MARGIN` free bytes.
pub const SAFETY_MARGIN: f64 = 1.1;

/// The quota would be exceeded by an admitted download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaWarning {
    pub usage: u64,
    pub limit: u64,
}

/// Outcome of a successful admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub required: u64,
    pub available: u64,
    /// Set when current usage plus `required` exceeds the quota.
    pub quota_warning: Option<QuotaWarning>,
}

/// Snapshot of the storage situation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub free_space: u64,
    /// Bytes used by the download directory.
    pub usage: u64,
    /// Configured quota.
    pub limit: u64,
}

/// Checks free space and quota before a download is admitted.
#[derive(Clone)]
pub struct StorageGuard {
    provider: Arc<dyn StorageProvider>,
}

impl StorageGuard {
    pub fn new(provider: Arc<dyn StorageProvider>) -> Self {
        Self { provider }
    }

    /// Bytes to reserve for a download of `expected_size` bytes.
    pub fn required_size(expected_size: u64) -> u64 {
        if expected_size == 0 {
            DEFAULT_REQUIRED_SIZE
        } else {
            expected_size
        }
    }

    /// Free space, or [`FALLBACK_FREE_SPACE`] when the query fails.
    pub async fn free_space(&self) -> u64 {
        match self.provider.free_space().await {
            Ok(free) => free,
            Err(e) => {
                warn!("Free space query failed, assuming {} bytes: {}", FALLBACK_FREE_SPACE, e);
                FALLBACK_FREE_SPACE
            }
        }
    }

    /// Usage of `directory`, 0 when it cannot be computed.
    pub async fn usage(&self, directory: &Path) -> u64 {
        match self.provider.directory_usage(directory).await {
            Ok(usage) => usage,
            Err(e) => {
                warn!("Could not compute usage of {:?}: {}", directory, e);
                0
            }
        }
    }

    /// Decides whether a download of `expected_size` bytes may be admitted.
    ///
    /// Fails with [`Error::InsufficientStorage`] when the device lacks the
    /// space. Exceeding the quota of `directory` only sets
    /// [`Admission::quota_warning`].
    pub async fn check(
        &self,
        expected_size: u64,
        directory: &Path,
        limit: u64,
    ) -> Result<Admission, Error> {
        let required = Self::required_size(expected_size);
        let available = self.free_space().await;
        if available < required {
            debug!("Rejecting download: {} bytes required, {} free", required, available);
            return Err(Error::InsufficientStorage {
                required,
                available,
            });
        }
        if (available as f64) < required as f64 * SAFETY_MARGIN {
            warn!(
                "Free space is running low: {} bytes free for a {} bytes download",
                available, required
            );
        }

        let usage = self.usage(directory).await;
        let quota_warning = if usage.saturating_add(required) > limit {
            warn!("Storage quota of {} bytes exceeded: {} bytes in use", limit, usage);
            Some(QuotaWarning { usage, limit })
        } else {
            None
        };

        Ok(Admission {
            required,
            available,
            quota_warning,
        })
    }

    /// Current free space, usage of `directory` and the quota.
    pub async fn info(&self, directory: &Path, limit: u64) -> StorageInfo {
        StorageInfo {
            free_space: self.free_space().await,
            usage: self.usage(directory).await,
            limit,
        }
    }
}

impl std::fmt::Debug for StorageGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageGuard").finish_non_exhaustive()
    }
}
