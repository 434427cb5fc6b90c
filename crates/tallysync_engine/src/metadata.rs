//! Persisted sync metadata: last successful sync and the terminal logs.

use crate::error::SyncResult;
use crate::records;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tallysync_protocol::{EntityType, LocalId, MutationAction, MutationId, TerminalMutation};
use tallysync_store::KeyValueStore;
use tokio::sync::Mutex;

/// Store key of the persisted metadata.
pub const METADATA_KEY: &str = "sync_metadata";

/// Number of evictions kept in the eviction log.
pub const EVICTION_LOG_LIMIT: usize = 200;

/// Sync bookkeeping that outlives the process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncMetadata {
    /// Time a drain last emptied the queue (Unix millis).
    pub last_successful_sync: Option<u64>,
    /// Mutations whose retries were exhausted. Kept until retried or
    /// discarded.
    pub stuck: Vec<TerminalMutation>,
    /// Most recent evictions, oldest first.
    pub evicted: Vec<TerminalMutation>,
}

/// Serialized access to [`SyncMetadata`].
pub struct MetadataStore<S: KeyValueStore> {
    store: Arc<S>,
    lock: Mutex<()>,
}

impl<S: KeyValueStore> MetadataStore<S> {
    /// Creates a metadata store over `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// Reads the current metadata.
    pub async fn load(&self) -> SyncResult<SyncMetadata> {
        let _guard = self.lock.lock().await;
        records::load_or_default(self.store.as_ref(), METADATA_KEY).await
    }

    async fn update<F, R>(&self, f: F) -> SyncResult<R>
    where
        F: FnOnce(&mut SyncMetadata) -> R,
    {
        let _guard = self.lock.lock().await;
        let mut metadata: SyncMetadata =
            records::load_or_default(self.store.as_ref(), METADATA_KEY).await?;
        let result = f(&mut metadata);
        records::save(self.store.as_ref(), METADATA_KEY, &metadata).await?;
        Ok(result)
    }

    /// Appends to the stuck log.
    pub async fn record_stuck(&self, record: TerminalMutation) -> SyncResult<()> {
        self.update(|m| m.stuck.push(record)).await
    }

    /// Appends to the eviction log, dropping the oldest entries beyond
    /// [`EVICTION_LOG_LIMIT`].
    pub async fn record_evicted(&self, record: TerminalMutation) -> SyncResult<()> {
        self.update(|m| {
            m.evicted.push(record);
            let excess = m.evicted.len().saturating_sub(EVICTION_LOG_LIMIT);
            m.evicted.drain(..excess);
        })
        .await
    }

    /// Removes mutation `id` from the stuck log and returns it.
    pub async fn take_stuck(&self, id: &MutationId) -> SyncResult<Option<TerminalMutation>> {
        self.update(|m| {
            let index = m.stuck.iter().position(|r| &r.mutation.id == id)?;
            Some(m.stuck.remove(index))
        })
        .await
    }

    /// Removes the stuck creates and updates of one entity and returns them.
    pub async fn remove_stuck_writes(
        &self,
        entity_type: EntityType,
        local_id: &LocalId,
    ) -> SyncResult<Vec<TerminalMutation>> {
        self.update(|m| {
            let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut m.stuck).into_iter().partition(|r| {
                r.mutation.targets(entity_type, local_id)
                    && r.mutation.action != MutationAction::Delete
            });
            m.stuck = kept;
            removed
        })
        .await
    }

    /// Records a successful sync at `now`.
    pub async fn set_last_sync(&self, now: u64) -> SyncResult<()> {
        self.update(|m| m.last_successful_sync = Some(now)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tallysync_protocol::PendingMutation;
    use tallysync_store::InMemoryStore;

    fn mutation() -> PendingMutation {
        PendingMutation::new(
            EntityType::Goal,
            MutationAction::Update,
            LocalId::from("local_g"),
            Some("g1"),
            Some("{}".into()),
        )
    }

    #[tokio::test]
    async fn stuck_log_round_trip() {
        let meta = MetadataStore::new(Arc::new(InMemoryStore::new()));
        let m = mutation();
        meta.record_stuck(TerminalMutation::stuck(m.clone(), "server error 500: boom", 7))
            .await
            .unwrap();

        let loaded = meta.load().await.unwrap();
        assert_eq!(loaded.stuck.len(), 1);
        assert!(loaded.stuck[0].is_stuck());

        let taken = meta.take_stuck(&m.id).await.unwrap().unwrap();
        assert_eq!(taken.mutation.id, m.id);
        assert!(meta.take_stuck(&m.id).await.unwrap().is_none());
        assert!(meta.load().await.unwrap().stuck.is_empty());
    }

    #[tokio::test]
    async fn eviction_log_is_bounded() {
        let meta = MetadataStore::new(Arc::new(InMemoryStore::new()));
        for i in 0..(EVICTION_LOG_LIMIT as u64 + 5) {
            meta.record_evicted(TerminalMutation::evicted(mutation(), 100, i))
                .await
                .unwrap();
        }
        let loaded = meta.load().await.unwrap();
        assert_eq!(loaded.evicted.len(), EVICTION_LOG_LIMIT);
        assert_eq!(loaded.evicted[0].recorded_at, 5);
    }

    #[tokio::test]
    async fn delete_clears_stuck_writes_of_entity() {
        let meta = MetadataStore::new(Arc::new(InMemoryStore::new()));
        let goal = LocalId::from("local_g");
        let other = PendingMutation::new(
            EntityType::Goal,
            MutationAction::Create,
            LocalId::from("local_h"),
            None,
            Some("{}".into()),
        );
        let delete = PendingMutation::new(EntityType::Goal, MutationAction::Delete, goal.clone(), Some("g1"), None);
        for m in [mutation(), other.clone(), delete.clone()] {
            meta.record_stuck(TerminalMutation::stuck(m, "server error 500: boom", 1))
                .await
                .unwrap();
        }

        let removed = meta.remove_stuck_writes(EntityType::Goal, &goal).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].mutation.action, MutationAction::Update);

        let left: Vec<_> = meta
            .load()
            .await
            .unwrap()
            .stuck
            .into_iter()
            .map(|r| r.mutation.id)
            .collect();
        assert_eq!(left, vec![other.id, delete.id]);
        assert!(meta
            .remove_stuck_writes(EntityType::Transaction, &goal)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn last_sync() {
        let meta = MetadataStore::new(Arc::new(InMemoryStore::new()));
        assert_eq!(meta.load().await.unwrap().last_successful_sync, None);
        meta.set_last_sync(42).await.unwrap();
        assert_eq!(meta.load().await.unwrap().last_successful_sync, Some(42));
    }
}
