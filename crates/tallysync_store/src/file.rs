//! File-based store for persistent storage.

use crate::backend::KeyValueStore;
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const RECORD_EXTENSION: &str = "rec";
const TEMP_EXTENSION: &str = "rec.tmp";

/// A directory-backed key-value store.
///
/// Each key is stored in its own file (`<key>.rec`) inside the store
/// directory. Values survive process restarts.
///
/// # Durability
///
/// `set` writes the new value to a temporary sibling file, calls
/// `sync_all`, then renames it over the old file. A crash mid-write leaves
/// either the old or the new value, never a torn one.
///
/// # Keys
///
/// Keys must be non-empty and consist of ASCII letters, digits, `_`, `-`
/// and `.`, and must not start with `.`.
///
/// # Example
///
/// ```no_run
/// use tallysync_store::{FileStore, KeyValueStore};
/// use std::path::Path;
///
/// # async fn demo() -> tallysync_store::StoreResult<()> {
/// let store = FileStore::open(Path::new("tallysync-data")).await?;
/// store.set("sync_metadata", b"...".to_vec()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Opens or creates a store rooted at `root`, creating the directory
    /// and its parents if needed.
    ///
    /// Leftover temporary files from an interrupted write are removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or scanned.
    pub async fn open(root: &Path) -> StoreResult<Self> {
        fs::create_dir_all(root).await?;

        let mut entries = fs::read_dir(root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if name.to_string_lossy().ends_with(TEMP_EXTENSION) {
                tracing::debug!(path = ?entry.path(), "removing interrupted write");
                fs::remove_file(entry.path()).await?;
            }
        }

        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(format!("{key}.{RECORD_EXTENSION}")))
    }
}

fn validate_key(key: &str) -> StoreResult<()> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey {
            key: key.to_string(),
            reason: "key is empty",
        });
    }
    if key.starts_with('.') {
        return Err(StoreError::InvalidKey {
            key: key.to_string(),
            reason: "key starts with '.'",
        });
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(StoreError::InvalidKey {
            key: key.to_string(),
            reason: "key contains characters outside [A-Za-z0-9_.-]",
        });
    }
    Ok(())
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        let path = self.path_for(key)?;
        let tmp = self.root.join(format!("{key}.{TEMP_EXTENSION}"));

        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&value).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(key) = name.strip_suffix(&format!(".{RECORD_EXTENSION}")) {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}
