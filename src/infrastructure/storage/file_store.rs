//! Directory-of-files key/value store for persistence across sessions.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, trace, warn};

use crate::domain::errors::StorageError;
use crate::domain::ports::KeyValueStore;

const ENTRY_EXTENSION: &str = "entry";

/// One stored key and its value. The key is kept in the file because file
/// names are hashes.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    key: String,
    value: String,
}

/// Key/value store keeping one JSON file per key in a directory.
///
/// Keys of files read or written by this process are remembered by path, so
/// listing keys only opens files it has not seen yet. Files that do not hold
/// a readable record are deleted when met.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    known: Mutex<HashMap<PathBuf, String>>,
}

impl FileStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created.
    pub async fn new(dir: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&dir).await?;
        debug!(path = %dir.display(), "Opened file store");
        Ok(Self {
            dir,
            known: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path holding `key`.
    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir
            .join(format!("{}.{ENTRY_EXTENSION}", hex::encode(&digest[..16])))
    }

    async fn entry_paths(&self) -> Result<Vec<PathBuf>, StorageError> {
        let mut paths = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION) {
                paths.push(path);
            }
        }

        Ok(paths)
    }

    /// Reads the record at `path`. A file that does not parse is deleted
    /// and reads as absent.
    async fn read_record(&self, path: &Path) -> Result<Option<StoredRecord>, StorageError> {
        let raw = match fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.known.lock().remove(path);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<StoredRecord>(&raw) {
            Ok(record) => {
                self.known
                    .lock()
                    .insert(path.to_path_buf(), record.key.clone());
                Ok(Some(record))
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Deleting unreadable store entry");
                self.delete_file(path).await?;
                Ok(None)
            }
        }
    }

    async fn delete_file(&self, path: &Path) -> Result<(), StorageError> {
        self.known.lock().remove(path);
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.entry_path(key);
        let Some(record) = self.read_record(&path).await? else {
            trace!(key = key, "File store miss");
            return Ok(None);
        };

        // Hash prefixes can collide; the stored key settles it.
        if record.key != key {
            warn!(key = key, path = %path.display(), "File store key collision");
            return Ok(None);
        }

        trace!(key = key, path = %path.display(), "File store hit");
        Ok(Some(record.value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.entry_path(key);
        let content = serde_json::to_vec(&StoredRecord {
            key: key.to_string(),
            value: value.to_string(),
        })?;
        let dir = self.dir.clone();
        let target = path.clone();

        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut temp_file = tempfile::NamedTempFile::new_in(&dir)?;
            temp_file.write_all(&content)?;
            temp_file.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Unavailable(format!("write task failed: {e}")))??;

        self.known.lock().insert(path.clone(), key.to_string());
        trace!(key = key, path = %path.display(), size = value.len(), "Stored value in file store");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.delete_file(&self.entry_path(key)).await?;
        trace!(key = key, "Removed value from file store");
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();

        for path in self.entry_paths().await? {
            let known = self.known.lock().get(&path).cloned();
            if let Some(key) = known {
                keys.push(key);
                continue;
            }

            match self.read_record(&path).await {
                Ok(Some(record)) => keys.push(record.key),
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read store entry");
                }
            }
        }

        Ok(keys)
    }

    async fn len(&self) -> Result<usize, StorageError> {
        Ok(self.keys().await?.len())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        for path in self.entry_paths().await? {
            if let Err(e) = self.delete_file(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to remove store entry");
            }
        }
        debug!(path = %self.dir.display(), "Cleared file store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_store() -> (FileStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path().join("images")).await.unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (store, _temp) = create_test_store().await;

        store.set("https://x/img.png", "payload").await.unwrap();

        assert_eq!(
            store.get("https://x/img.png").await.unwrap(),
            Some("payload".to_string())
        );
        assert_eq!(store.get("https://x/other.png").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_overwrite_keeps_single_entry() {
        let (store, _temp) = create_test_store().await;

        store.set("k", "one").await.unwrap();
        store.set("k", "two").await.unwrap();

        assert_eq!(store.len().await.unwrap(), 1);
        assert_eq!(store.get("k").await.unwrap(), Some("two".to_string()));
    }

    #[tokio::test]
    async fn test_keys_returns_original_keys() {
        let (store, _temp) = create_test_store().await;

        store.set("img:https://x/a.png", "a").await.unwrap();
        store.set("img:https://x/b.png", "b").await.unwrap();

        let mut keys = store.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["img:https://x/a.png", "img:https://x/b.png"]);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let (store, _temp) = create_test_store().await;

        store.set("a", "1").await.unwrap();
        store.set("b", "2").await.unwrap();
        store.remove("a").await.unwrap();
        store.remove("missing").await.unwrap();
        assert_eq!(store.len().await.unwrap(), 1);

        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_entry_is_deleted_when_listed() {
        let (store, _temp) = create_test_store().await;
        store.set("image:https://x/a.png", "a").await.unwrap();
        let stray = store.dir().join(format!("0badc0de.{ENTRY_EXTENSION}"));
        std::fs::write(&stray, "{trunc").unwrap();

        assert_eq!(store.keys().await.unwrap(), vec!["image:https://x/a.png"]);
        assert!(!stray.exists());
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_entry_is_a_miss() {
        let (store, _temp) = create_test_store().await;
        let path = store.entry_path("k");
        std::fs::write(&path, "not json").unwrap();

        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_keys_of_known_entries_skip_reading() {
        let (store, _temp) = create_test_store().await;
        store.set("k", "v").await.unwrap();

        // Garbage in a known entry is not noticed by listing.
        std::fs::write(store.entry_path("k"), "{trunc").unwrap();

        assert_eq!(store.keys().await.unwrap(), vec!["k"]);
        store.remove("k").await.unwrap();
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().to_path_buf();

        FileStore::new(dir.clone())
            .await
            .unwrap()
            .set("k", "v")
            .await
            .unwrap();

        let reopened = FileStore::new(dir).await.unwrap();
        assert_eq!(reopened.get("k").await.unwrap(), Some("v".to_string()));
    }
}
