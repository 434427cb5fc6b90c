//! Store trait definition.

use crate::error::StoreResult;
use async_trait::async_trait;

/// A durable, asynchronous, string-keyed store.
///
/// Stores are **opaque byte maps**. The sync engine owns all record
/// interpretation; stores do not understand queues, caches or schema
/// versions.
///
/// # Invariants
///
/// - `get` returns exactly the bytes passed to the last successful `set`
///   for that key, or `None` if the key was never set or was removed
/// - `set` replaces the whole value; a reader never observes a partial write
/// - `remove` of a missing key succeeds
/// - Stores must be `Send + Sync` so they can be shared behind an `Arc`
///
/// Stores offer no transactions. Callers that need read-modify-write
/// atomicity must serialize access themselves.
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// After this returns successfully the value survives process
    /// termination (for persistent stores).
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the write fails.
    async fn set(&self, key: &str, value: Vec<u8>) -> StoreResult<()>;

    /// Removes the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the removal fails.
    async fn remove(&self, key: &str) -> StoreResult<()>;

    /// Lists all keys currently present, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the keys cannot be enumerated.
    async fn keys(&self) -> StoreResult<Vec<String>>;
}
