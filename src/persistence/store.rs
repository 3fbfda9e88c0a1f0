//! Key-value stores the manager state is written to.

use crate::error::Error;

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

/// Minimal persistent key-value contract.
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    /// Value stored under `key`, `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error>;

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), Error>;

    /// Removes `key`; removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), Error>;
}

/// In-memory store, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), Error> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// Stores each key as a JSON file inside a directory.
///
/// Writes go to a temporary file first and are renamed into place, so a crash
/// mid-write leaves the previous value intact.
#[derive(Debug, Clone)]
pub struct FileStore {
    directory: PathBuf,
}

impl FileStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' => '_',
                c => c,
            })
            .collect();
        self.directory.join(format!("{}.json", name))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        match fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), Error> {
        fs::create_dir_all(&self.directory).await?;
        let path = self.path_for(key);
        let temp_path = path.with_extension("json.tmp");

        fs::write(&temp_path, &value).await?;
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        debug!("Wrote {} bytes to {:?}", value.len(), path);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", b"v".to_vec()).await.unwrap();
        let clone = store.clone();
        assert_eq!(clone.get("k").await.unwrap(), Some(b"v".to_vec()));

        store.remove("k").await.unwrap();
        assert!(clone.is_empty().await);
    }

    #[tokio::test]
    async fn test_file_store_overwrites_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("state"));

        store.set("haul.downloads", b"first".to_vec()).await.unwrap();
        store.set("haul.downloads", b"second".to_vec()).await.unwrap();

        assert_eq!(
            store.get("haul.downloads").await.unwrap(),
            Some(b"second".to_vec())
        );
        assert!(dir.path().join("state").join("haul.downloads.json").exists());
        assert!(!dir.path().join("state").join("haul.downloads.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert_eq!(store.get("absent").await.unwrap(), None);
        assert!(store.remove("absent").await.is_ok());
    }

    #[test]
    fn test_keys_cannot_escape_directory() {
        let store = FileStore::new("/var/lib/haul");
        assert_eq!(
            store.path_for("../etc/passwd"),
            PathBuf::from("/var/lib/haul/.._etc_passwd.json")
        );
    }
}
