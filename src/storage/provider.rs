//! Filesystem statistics providers.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Answers the two questions the storage guard asks about the device.
#[async_trait]
pub trait StorageProvider: Send + Sync + 'static {
    /// Bytes available to the current user on the download device.
    async fn free_space(&self) -> io::Result<u64>;

    /// Total size of the files below `path`, 0 when it does not exist.
    async fn directory_usage(&self, path: &Path) -> io::Result<u64>;
}

/// Statistics of the local disk holding `root`.
#[derive(Debug, Clone)]
pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl StorageProvider for DiskStorage {
    async fn free_space(&self) -> io::Result<u64> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            // The download directory may not exist yet: ask the closest ancestor.
            let existing = root
                .ancestors()
                .find(|candidate| candidate.exists())
                .unwrap_or_else(|| Path::new("."));
            debug!("Querying free space of {:?}", existing);
            fs2::available_space(existing)
        })
        .await
        .map_err(io::Error::other)?
    }

    async fn directory_usage(&self, path: &Path) -> io::Result<u64> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || walk_usage(&path))
            .await
            .map_err(io::Error::other)?
    }
}

/// Sums file sizes below `path` without following symlinks.
fn walk_usage(path: &Path) -> io::Result<u64> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    if metadata.is_file() {
        return Ok(metadata.len());
    }
    if !metadata.is_dir() {
        return Ok(0);
    }

    let mut total = 0;
    let mut pending = vec![path.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                total += entry.metadata()?.len();
            }
        }
    }
    Ok(total)
}
