//! Entity cache.
//!
//! One cache per [`EntityType`], persisted under `cache_<entity type>`.
//! Local writes land here first (unsynced) and are confirmed once the
//! server acknowledges them.

use crate::error::SyncResult;
use crate::records;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use tallysync_protocol::{CachedEntity, EntityType, LocalId};
use tallysync_store::KeyValueStore;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Result of [`EntityCache::mark_synced`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkSynced {
    /// The entity is now synced.
    Updated,
    /// The entity was already synced; nothing changed.
    AlreadySynced,
    /// No entity with that local id; nothing changed.
    NotFound,
}

/// Locally known copies of one entity type.
pub struct EntityCache<S: KeyValueStore, T> {
    store: Arc<S>,
    entity_type: EntityType,
    key: String,
    lock: Mutex<()>,
    _payload: PhantomData<fn() -> T>,
}

impl<S, T> EntityCache<S, T>
where
    S: KeyValueStore,
    T: Serialize + DeserializeOwned + Clone,
{
    /// Creates the cache of `entity_type` persisted in `store`.
    pub fn new(store: Arc<S>, entity_type: EntityType) -> Self {
        Self {
            store,
            entity_type,
            key: entity_type.cache_key(),
            lock: Mutex::new(()),
            _payload: PhantomData,
        }
    }

    /// Returns the cached entity type.
    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    async fn load(&self) -> SyncResult<Vec<CachedEntity<T>>> {
        records::load_or_default(self.store.as_ref(), &self.key).await
    }

    async fn persist(&self, entities: &[CachedEntity<T>]) -> SyncResult<()> {
        records::save(self.store.as_ref(), &self.key, &entities).await
    }

    /// Records a local write: inserts or replaces the payload of `local_id`
    /// and marks it unsynced. A known remote id is kept.
    pub async fn upsert_local(&self, local_id: LocalId, payload: T, now: u64) -> SyncResult<CachedEntity<T>> {
        let _guard = self.lock.lock().await;
        let mut entities = self.load().await?;

        let entity = match entities.iter_mut().find(|e| e.local_id == local_id) {
            Some(existing) => {
                existing.payload = payload;
                existing.synced = false;
                existing.last_modified = now;
                existing.clone()
            }
            None => {
                let entity = CachedEntity::unsynced(local_id, payload, now);
                entities.push(entity.clone());
                entity
            }
        };

        self.persist(&entities).await?;
        Ok(entity)
    }

    /// Inserts or replaces `entity` exactly as given, e.g. a record fetched
    /// from the server.
    pub async fn upsert(&self, entity: CachedEntity<T>) -> SyncResult<()> {
        let _guard = self.lock.lock().await;
        let mut entities = self.load().await?;

        match entities.iter_mut().find(|e| e.local_id == entity.local_id) {
            Some(existing) => *existing = entity,
            None => entities.push(entity),
        }
        self.persist(&entities).await
    }

    /// Marks `local_id` as confirmed by the server under `remote_id`.
    ///
    /// Marking an already synced entity again changes nothing, so a
    /// duplicated response cannot corrupt the cache. A missing entity is
    /// logged and ignored.
    pub async fn mark_synced(&self, local_id: &LocalId, remote_id: &str, now: u64) -> SyncResult<MarkSynced> {
        self.apply_synced(local_id, remote_id, None, now).await
    }

    /// Like [`EntityCache::mark_synced`], also replacing the payload with
    /// the state the server returned.
    pub async fn mark_synced_with_state(
        &self,
        local_id: &LocalId,
        remote_id: &str,
        server_state: T,
        now: u64,
    ) -> SyncResult<MarkSynced> {
        self.apply_synced(local_id, remote_id, Some(server_state), now).await
    }

    async fn apply_synced(
        &self,
        local_id: &LocalId,
        remote_id: &str,
        server_state: Option<T>,
        now: u64,
    ) -> SyncResult<MarkSynced> {
        let _guard = self.lock.lock().await;
        let mut entities = self.load().await?;

        let Some(entity) = entities.iter_mut().find(|e| &e.local_id == local_id) else {
            warn!(
                entity_type = %self.entity_type,
                local_id = %local_id,
                "mark synced: entity not in cache"
            );
            return Ok(MarkSynced::NotFound);
        };

        if entity.synced {
            if entity.remote_id.as_deref() != Some(remote_id) {
                debug!(
                    local_id = %local_id,
                    cached = ?entity.remote_id,
                    received = remote_id,
                    "ignoring second confirmation with a different remote id"
                );
            }
            return Ok(MarkSynced::AlreadySynced);
        }

        entity.remote_id = Some(remote_id.to_string());
        entity.synced = true;
        entity.last_modified = now;
        if let Some(state) = server_state {
            entity.payload = state;
        }
        self.persist(&entities).await?;
        Ok(MarkSynced::Updated)
    }

    /// Records the server id of an entity without marking it synced.
    ///
    /// Used when a create was acknowledged but a newer local write is
    /// still queued. Returns false if the entity is unknown.
    pub async fn attach_remote_id(&self, local_id: &LocalId, remote_id: &str) -> SyncResult<bool> {
        let _guard = self.lock.lock().await;
        let mut entities = self.load().await?;

        let Some(entity) = entities.iter_mut().find(|e| &e.local_id == local_id) else {
            return Ok(false);
        };
        if entity.remote_id.as_deref() == Some(remote_id) {
            return Ok(true);
        }
        entity.remote_id = Some(remote_id.to_string());
        self.persist(&entities).await?;
        Ok(true)
    }

    /// Deletes `local_id` regardless of its sync state.
    pub async fn remove(&self, local_id: &LocalId) -> SyncResult<Option<CachedEntity<T>>> {
        let _guard = self.lock.lock().await;
        let mut entities = self.load().await?;

        let Some(index) = entities.iter().position(|e| &e.local_id == local_id) else {
            return Ok(None);
        };
        let removed = entities.remove(index);
        self.persist(&entities).await?;
        Ok(Some(removed))
    }

    /// Returns the entity cached under `local_id`.
    pub async fn get(&self, local_id: &LocalId) -> SyncResult<Option<CachedEntity<T>>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.into_iter().find(|e| &e.local_id == local_id))
    }

    /// Returns all cached entities in insertion order.
    pub async fn list(&self) -> SyncResult<Vec<CachedEntity<T>>> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    /// Returns all entities awaiting confirmation, least recently modified
    /// first.
    pub async fn list_unsynced(&self) -> SyncResult<Vec<CachedEntity<T>>> {
        let mut unsynced: Vec<_> = self.list().await?.into_iter().filter(|e| !e.synced).collect();
        unsynced.sort_by(|a, b| {
            a.last_modified
                .cmp(&b.last_modified)
                .then_with(|| a.local_id.cmp(&b.local_id))
        });
        Ok(unsynced)
    }
}
