//! Storage admission checks.
//!
//! Every download is checked by the [`StorageGuard`] before it is admitted:
//! it must fit in the free space of the device, and a warning is raised when
//! it would push the download directory over the configured quota.
//!
//! - [`provider`] - the [`StorageProvider`] contract and [`DiskStorage`]
//! - [`guard`] - [`StorageGuard`] and its thresholds

pub mod guard;
pub mod provider;

pub use guard::{
    Admission, QuotaWarning, StorageGuard, StorageInfo, DEFAULT_REQUIRED_SIZE,
    FALLBACK_FREE_SPACE, SAFETY_MARGIN,
};
pub use provider::{DiskStorage, StorageProvider};
