//! In-memory store for testing.

use crate::backend::KeyValueStore;
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// An in-memory key-value store.
///
/// This store keeps all values in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral sessions that don't need persistence
///
/// It counts writes so tests can assert on persistence traffic, and it can
/// be switched into a failing mode to exercise storage error paths.
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across tasks.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<BTreeMap<String, Vec<u8>>>,
    writes: AtomicU64,
    failing: AtomicBool,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the raw value under `key` without going through
    /// the async interface.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.data.read().get(key).cloned()
    }

    /// Returns the number of successful `set` and `remove` calls.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Makes every subsequent operation fail with [`StoreError::Closed`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_open(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.check_open()?;
        Ok(self.data.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        self.check_open()?;
        self.data.write().insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.check_open()?;
        self.data.write().remove(key);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn keys(&self) -> StoreResult<Vec<String>> {
        self.check_open()?;
        Ok(self.data.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_new_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.keys().await.unwrap().is_empty());
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_set_then_get() {
        let store = InMemoryStore::new();
        store.set("a", b"hello".to_vec()).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn memory_set_replaces() {
        let store = InMemoryStore::new();
        store.set("a", b"one".to_vec()).await.unwrap();
        store.set("a", b"two".to_vec()).await.unwrap();
        assert_eq!(store.raw("a"), Some(b"two".to_vec()));
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn memory_remove_missing_is_ok() {
        let store = InMemoryStore::new();
        store.remove("nothing").await.unwrap();
        store.set("a", vec![1]).await.unwrap();
        store.remove("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_keys_sorted() {
        let store = InMemoryStore::new();
        store.set("b", vec![2]).await.unwrap();
        store.set("a", vec![1]).await.unwrap();
        assert_eq!(store.keys().await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn memory_failing_mode() {
        let store = InMemoryStore::new();
        store.set_failing(true);
        assert!(matches!(store.get("a").await, Err(StoreError::Closed)));
        assert!(store.set("a", vec![1]).await.is_err());

        store.set_failing(false);
        assert!(store.set("a", vec![1]).await.is_ok());
    }
}
