//! Pending mutation queue.
//!
//! A bounded, priority-ordered list of writes the server has not yet
//! acknowledged, persisted under [`QUEUE_KEY`]. Every operation loads the
//! whole list, changes it and writes it back while holding the queue lock,
//! so a submission can never interleave with the drain loop's updates.
//!
//! # Ordering
//!
//! [`PendingMutationQueue::dequeue_next`] picks the eligible mutation with
//! the highest priority, then the lowest `enqueued_at`, then the earliest
//! position in the list.
//!
//! # Coalescing
//!
//! At most one mutation per `(entity_type, local_id)` is queued. A second
//! write to the same entity is merged into the queued one:
//!
//! | queued | new    | result                             |
//! |--------|--------|------------------------------------|
//! | create | update | create with the new payload        |
//! | update | update | update with the new payload        |
//! | update | delete | delete                             |
//! | create | delete | both cancelled (or delete if sent) |
//! | delete | any    | delete                             |

use crate::error::SyncResult;
use crate::records;
use std::cmp::Reverse;
use std::sync::Arc;
use tallysync_protocol::{EntityType, LocalId, MutationAction, MutationId, PendingMutation};
use tallysync_store::KeyValueStore;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Store key of the persisted queue.
pub const QUEUE_KEY: &str = "pending_mutations";

/// What happened to an enqueued mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Appended as a new entry.
    Queued(MutationId),
    /// Merged into the entry already queued for the same entity.
    Merged(MutationId),
    /// Cancelled out the queued create of an entity that was never sent.
    Cancelled(MutationId),
}

/// Result of [`PendingMutationQueue::enqueue`].
#[derive(Debug, Clone, PartialEq)]
pub struct EnqueueReport {
    /// What happened to the new mutation.
    pub outcome: EnqueueOutcome,
    /// The entry evicted to make room, if the queue was full.
    pub evicted: Option<PendingMutation>,
}

/// Result of [`PendingMutationQueue::acknowledge`].
#[derive(Debug, Clone, PartialEq)]
pub enum AckOutcome {
    /// The entry was removed.
    Removed,
    /// The entry was changed while in flight and stays queued, retargeted
    /// at the server id.
    Retained(PendingMutation),
    /// The entry was no longer queued.
    Missing,
}

/// Result of [`PendingMutationQueue::cancel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The queued entry was removed.
    Cancelled(MutationId),
    /// The queued entry is in flight; it was turned into a delete.
    Merged(MutationId),
    /// Nothing was queued for the entity.
    NotQueued,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct InFlight {
    id: MutationId,
    revision: u32,
}

#[derive(Debug, Default)]
struct QueueState {
    in_flight: Option<InFlight>,
}

impl QueueState {
    fn is_in_flight(&self, id: &MutationId) -> bool {
        self.in_flight.as_ref().is_some_and(|f| &f.id == id)
    }

    fn settle(&mut self, id: &MutationId) {
        if self.is_in_flight(id) {
            self.in_flight = None;
        }
    }
}

/// A delete merged into a create that was in flight. It has no server id to
/// address, so it is dropped if that create turns out not to have landed.
pub(crate) fn is_unaddressed_delete(m: &PendingMutation) -> bool {
    m.action == MutationAction::Delete && m.endpoint == m.entity_type.resource()
}

/// Index of the entry [`PendingMutationQueue::dequeue_next`] would pick.
fn next_index(list: &[PendingMutation], now: u64) -> Option<usize> {
    list.iter()
        .enumerate()
        .filter(|(_, m)| m.is_eligible(now))
        .max_by_key(|(i, m)| (m.priority, Reverse(m.enqueued_at), Reverse(*i)))
        .map(|(i, _)| i)
}

/// Index of the entry to evict: lowest priority, then oldest.
fn eviction_index(list: &[PendingMutation], state: &QueueState) -> Option<usize> {
    list.iter()
        .enumerate()
        .filter(|(_, m)| !state.is_in_flight(&m.id))
        .min_by_key(|(i, m)| (m.priority, m.enqueued_at, *i))
        .map(|(i, _)| i)
}

/// The durable pending mutation queue.
pub struct PendingMutationQueue<S: KeyValueStore> {
    store: Arc<S>,
    capacity: usize,
    state: Mutex<QueueState>,
}

impl<S: KeyValueStore> PendingMutationQueue<S> {
    /// Creates a queue persisted in `store` holding at most `capacity`
    /// entries.
    pub fn new(store: Arc<S>, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Returns the capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    async fn load(&self) -> SyncResult<Vec<PendingMutation>> {
        records::load_or_default(self.store.as_ref(), QUEUE_KEY).await
    }

    async fn persist(&self, list: &[PendingMutation]) -> SyncResult<()> {
        records::save(self.store.as_ref(), QUEUE_KEY, &list).await
    }

    /// Adds `mutation`, stamping it with `now`.
    ///
    /// If an entry for the same entity is already queued the two are merged
    /// (see the module docs). If the queue is full, the lowest-priority
    /// oldest entry is evicted; the new mutation and the in-flight entry are
    /// never evicted.
    pub async fn enqueue(&self, mut mutation: PendingMutation, now: u64) -> SyncResult<EnqueueReport> {
        let state = self.state.lock().await;
        let mut list = self.load().await?;

        if let Some(index) = list
            .iter()
            .position(|m| m.targets(mutation.entity_type, &mutation.local_id))
        {
            let in_flight = state.is_in_flight(&list[index].id);
            let outcome = coalesce(&mut list, index, mutation, in_flight);
            self.persist(&list).await?;
            return Ok(EnqueueReport {
                outcome,
                evicted: None,
            });
        }

        let mut evicted = None;
        if list.len() >= self.capacity {
            match eviction_index(&list, &state) {
                Some(index) => {
                    let victim = list.remove(index);
                    warn!(
                        mutation_id = %victim.id,
                        entity_type = %victim.entity_type,
                        priority = %victim.priority,
                        capacity = self.capacity,
                        "queue full, evicting pending mutation"
                    );
                    evicted = Some(victim);
                }
                None => warn!(capacity = self.capacity, "queue full and nothing evictable"),
            }
        }

        mutation.enqueued_at = now;
        let id = mutation.id.clone();
        debug!(
            mutation_id = %id,
            entity_type = %mutation.entity_type,
            action = %mutation.action,
            "mutation queued"
        );
        list.push(mutation);
        self.persist(&list).await?;

        Ok(EnqueueReport {
            outcome: EnqueueOutcome::Queued(id),
            evicted,
        })
    }

    /// Returns the next mutation to replay at `now` and marks it in flight.
    ///
    /// The mutation stays queued until it is acknowledged, requeued or
    /// removed.
    pub async fn dequeue_next(&self, now: u64) -> SyncResult<Option<PendingMutation>> {
        let mut state = self.state.lock().await;
        let list = self.load().await?;

        let next = next_index(&list, now).map(|i| list[i].clone());
        state.in_flight = next.as_ref().map(|m| InFlight {
            id: m.id.clone(),
            revision: m.revision,
        });
        Ok(next)
    }

    /// Settles a successful replay of `revision` of mutation `id`.
    ///
    /// If the entry was merged into after it was sent, it stays queued and
    /// is retargeted at `remote_id`.
    pub async fn acknowledge(
        &self,
        id: &MutationId,
        revision: u32,
        remote_id: Option<&str>,
    ) -> SyncResult<AckOutcome> {
        let mut state = self.state.lock().await;
        state.settle(id);
        let mut list = self.load().await?;

        let Some(index) = list.iter().position(|m| &m.id == id) else {
            return Ok(AckOutcome::Missing);
        };

        if list[index].revision == revision {
            list.remove(index);
            self.persist(&list).await?;
            return Ok(AckOutcome::Removed);
        }

        let entry = &mut list[index];
        let action = match entry.action {
            MutationAction::Create => MutationAction::Update,
            other => other,
        };
        match remote_id {
            Some(remote_id) => entry.retarget(action, Some(remote_id)),
            None => {
                entry.action = action;
                entry.method = action.method();
            }
        }
        entry.retry_count = 0;
        entry.not_before = None;
        entry.ambiguous = false;
        entry.last_error = None;
        let retained = entry.clone();
        debug!(mutation_id = %id, action = %retained.action, "acknowledged stale revision, entry retained");

        self.persist(&list).await?;
        Ok(AckOutcome::Retained(retained))
    }

    /// Moves a failed mutation to the tail of its priority band.
    ///
    /// Retry bookkeeping (`retry_count`, `not_before`, `last_error`,
    /// `ambiguous`) is taken from `failed`; everything else from the queued
    /// entry, which may have been merged into meanwhile. Returns the entry
    /// as requeued, or `None` if it is gone.
    pub async fn requeue(&self, failed: &PendingMutation, now: u64) -> SyncResult<Option<PendingMutation>> {
        let mut state = self.state.lock().await;
        state.settle(&failed.id);
        let mut list = self.load().await?;

        let Some(index) = list.iter().position(|m| m.id == failed.id) else {
            debug!(mutation_id = %failed.id, "requeue of mutation no longer queued");
            return Ok(None);
        };

        let mut entry = list.remove(index);
        if is_unaddressed_delete(&entry) {
            debug!(mutation_id = %entry.id, "dropping delete of entity that was never created");
            self.persist(&list).await?;
            return Ok(None);
        }

        entry.retry_count = failed.retry_count;
        entry.not_before = failed.not_before;
        entry.last_error = failed.last_error.clone();
        entry.ambiguous = entry.ambiguous || failed.ambiguous;
        entry.enqueued_at = now;
        list.push(entry.clone());
        self.persist(&list).await?;
        Ok(Some(entry))
    }

    /// Clears the in-flight mark of `id` without touching the entry.
    pub async fn release(&self, id: &MutationId) -> SyncResult<()> {
        let mut state = self.state.lock().await;
        state.settle(id);
        let mut list = self.load().await?;

        if let Some(index) = list.iter().position(|m| &m.id == id && is_unaddressed_delete(m)) {
            list.remove(index);
            self.persist(&list).await?;
        }
        Ok(())
    }

    /// Removes mutation `id`, returning it.
    pub async fn remove(&self, id: &MutationId) -> SyncResult<Option<PendingMutation>> {
        let mut state = self.state.lock().await;
        state.settle(id);
        let mut list = self.load().await?;

        let Some(index) = list.iter().position(|m| &m.id == id) else {
            return Ok(None);
        };
        let removed = list.remove(index);
        self.persist(&list).await?;
        Ok(Some(removed))
    }

    /// Withdraws whatever is queued for an entity the server has never
    /// seen, as part of deleting it locally.
    pub async fn cancel(&self, entity_type: EntityType, local_id: &LocalId) -> SyncResult<CancelOutcome> {
        let state = self.state.lock().await;
        let mut list = self.load().await?;

        let Some(index) = list.iter().position(|m| m.targets(entity_type, local_id)) else {
            return Ok(CancelOutcome::NotQueued);
        };

        let entry = &mut list[index];
        let outcome = if state.is_in_flight(&entry.id) {
            entry.action = MutationAction::Delete;
            entry.method = MutationAction::Delete.method();
            entry.payload = None;
            entry.revision += 1;
            CancelOutcome::Merged(entry.id.clone())
        } else {
            let removed = list.remove(index);
            debug!(mutation_id = %removed.id, local_id = %local_id, "queued mutation cancelled");
            CancelOutcome::Cancelled(removed.id)
        };

        self.persist(&list).await?;
        Ok(outcome)
    }

    /// Returns all queued mutations in insertion order.
    pub async fn list(&self) -> SyncResult<Vec<PendingMutation>> {
        let _state = self.state.lock().await;
        self.load().await
    }

    /// Returns all queued mutations in the order they would be replayed,
    /// ignoring backoff.
    pub async fn list_in_drain_order(&self) -> SyncResult<Vec<PendingMutation>> {
        let mut list = self.list().await?;
        let mut ordered = Vec::with_capacity(list.len());
        while let Some(index) = next_index(&list, u64::MAX) {
            ordered.push(list.remove(index));
        }
        Ok(ordered)
    }

    /// Returns the number of queued mutations.
    pub async fn len(&self) -> SyncResult<usize> {
        Ok(self.list().await?.len())
    }

    /// Returns true if nothing is queued.
    pub async fn is_empty(&self) -> SyncResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Returns the earliest `not_before` among backed-off entries.
    pub async fn next_wake(&self) -> SyncResult<Option<u64>> {
        Ok(self.list().await?.iter().filter_map(|m| m.not_before).min())
    }

    /// Returns the id of the entry currently being replayed.
    pub async fn in_flight(&self) -> Option<MutationId> {
        self.state.lock().await.in_flight.as_ref().map(|f| f.id.clone())
    }
}

/// Merges `incoming` into `list[index]`.
fn coalesce(
    list: &mut Vec<PendingMutation>,
    index: usize,
    incoming: PendingMutation,
    in_flight: bool,
) -> EnqueueOutcome {
    let queued_action = list[index].action;

    if queued_action == MutationAction::Create
        && incoming.action == MutationAction::Delete
        && !in_flight
    {
        let cancelled = list.remove(index);
        debug!(mutation_id = %cancelled.id, "create cancelled by delete before it was sent");
        return EnqueueOutcome::Cancelled(cancelled.id);
    }

    let entry = &mut list[index];
    match (queued_action, incoming.action) {
        (MutationAction::Delete, _) => {}
        (_, MutationAction::Delete) => {
            entry.action = MutationAction::Delete;
            entry.method = MutationAction::Delete.method();
            entry.payload = None;
        }
        _ => entry.payload = incoming.payload,
    }
    entry.priority = entry.priority.max(incoming.priority);
    entry.revision += 1;
    debug!(
        mutation_id = %entry.id,
        action = %entry.action,
        revision = entry.revision,
        "mutation merged into queued entry"
    );
    EnqueueOutcome::Merged(entry.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tallysync_protocol::Priority;
    use tallysync_store::InMemoryStore;

    fn queue(capacity: usize) -> PendingMutationQueue<InMemoryStore> {
        PendingMutationQueue::new(Arc::new(InMemoryStore::new()), capacity)
    }

    fn create(local: &str, priority: Priority) -> PendingMutation {
        PendingMutation::new(
            EntityType::Transaction,
            MutationAction::Create,
            LocalId::from(local),
            None,
            Some(format!(r#"{{"note":"{local}"}}"#)),
        )
        .with_priority(priority)
    }

    fn update(local: &str, remote: &str) -> PendingMutation {
        PendingMutation::new(
            EntityType::Transaction,
            MutationAction::Update,
            LocalId::from(local),
            Some(remote),
            Some(r#"{"note":"edited"}"#.into()),
        )
    }

    fn delete(local: &str, remote: Option<&str>) -> PendingMutation {
        PendingMutation::new(
            EntityType::Transaction,
            MutationAction::Delete,
            LocalId::from(local),
            remote,
            None,
        )
    }

    async fn drain_ids(q: &PendingMutationQueue<InMemoryStore>) -> Vec<String> {
        let mut order = Vec::new();
        while let Some(m) = q.dequeue_next(u64::MAX).await.unwrap() {
            q.acknowledge(&m.id, m.revision, Some("srv")).await.unwrap();
            order.push(m.local_id.to_string());
        }
        order
    }

    #[tokio::test]
    async fn priority_then_age() {
        let q = queue(10);
        q.enqueue(create("a", Priority::Low), 1).await.unwrap();
        q.enqueue(create("b", Priority::High), 2).await.unwrap();
        q.enqueue(create("c", Priority::High), 0).await.unwrap();

        assert_eq!(drain_ids(&q).await, vec!["c", "b", "a"]);
        assert!(q.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn equal_timestamps_keep_insertion_order() {
        let q = queue(10);
        for name in ["x", "y", "z"] {
            q.enqueue(create(name, Priority::Medium), 5).await.unwrap();
        }
        assert_eq!(drain_ids(&q).await, vec!["x", "y", "z"]);
    }

    #[tokio::test]
    async fn eviction_removes_lowest_priority_oldest() {
        let q = queue(100);
        q.enqueue(create("old-high", Priority::High), 0).await.unwrap();
        for i in 0..99u64 {
            let priority = if i == 50 { Priority::Low } else { Priority::Medium };
            q.enqueue(create(&format!("m{i}"), priority), i + 1).await.unwrap();
        }
        assert_eq!(q.len().await.unwrap(), 100);

        let newcomer = create("newcomer", Priority::Low);
        let newcomer_id = newcomer.id.clone();
        let report = q.enqueue(newcomer, 1_000).await.unwrap();

        assert_eq!(report.outcome, EnqueueOutcome::Queued(newcomer_id.clone()));
        let evicted = report.evicted.unwrap();
        assert_eq!(evicted.local_id.as_str(), "m50");

        let list = q.list().await.unwrap();
        assert_eq!(list.len(), 100);
        assert!(list.iter().any(|m| m.id == newcomer_id));
        assert!(list.iter().all(|m| m.local_id.as_str() != "m50"));
    }

    #[tokio::test]
    async fn eviction_with_equal_priorities_is_strictly_oldest() {
        let q = queue(3);
        for (i, name) in ["a", "b", "c"].into_iter().enumerate() {
            q.enqueue(create(name, Priority::Medium), 10 + i as u64).await.unwrap();
        }
        let report = q.enqueue(create("d", Priority::Medium), 20).await.unwrap();
        assert_eq!(report.evicted.unwrap().local_id.as_str(), "a");
    }

    #[tokio::test]
    async fn in_flight_entry_is_never_evicted() {
        let q = queue(2);
        q.enqueue(create("a", Priority::Low), 1).await.unwrap();
        let sent = q.dequeue_next(1).await.unwrap().unwrap();
        assert_eq!(sent.local_id.as_str(), "a");

        q.enqueue(create("b", Priority::High), 2).await.unwrap();
        let report = q.enqueue(create("c", Priority::High), 3).await.unwrap();

        assert_eq!(report.evicted.unwrap().local_id.as_str(), "b");
        let names: Vec<_> = q
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.local_id.to_string())
            .collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn create_then_update_coalesces() {
        let q = queue(10);
        let c = create("e1", Priority::Medium);
        let id = c.id.clone();
        q.enqueue(c, 1).await.unwrap();

        let mut u = update("e1", "ignored");
        u.payload = Some(r#"{"note":"v2"}"#.into());
        let report = q.enqueue(u, 2).await.unwrap();
        assert_eq!(report.outcome, EnqueueOutcome::Merged(id));

        let list = q.list().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].action, MutationAction::Create);
        assert_eq!(list[0].payload.as_deref(), Some(r#"{"note":"v2"}"#));
        assert_eq!(list[0].revision, 1);
        assert_eq!(list[0].enqueued_at, 1);
    }

    #[tokio::test]
    async fn create_then_delete_cancels() {
        let q = queue(10);
        q.enqueue(create("e1", Priority::Medium), 1).await.unwrap();
        let report = q.enqueue(delete("e1", None), 2).await.unwrap();
        assert!(matches!(report.outcome, EnqueueOutcome::Cancelled(_)));
        assert!(q.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn update_then_delete_becomes_delete() {
        let q = queue(10);
        q.enqueue(update("e1", "r1"), 1).await.unwrap();
        q.enqueue(delete("e1", Some("r1")), 2).await.unwrap();

        let list = q.list().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].action, MutationAction::Delete);
        assert_eq!(list[0].endpoint, "/transactions/r1");
        assert!(list[0].payload.is_none());
    }

    #[tokio::test]
    async fn stale_ack_retargets_create() {
        let q = queue(10);
        q.enqueue(create("e1", Priority::High), 1).await.unwrap();
        let sent = q.dequeue_next(1).await.unwrap().unwrap();

        // User edits the entity while its create is on the wire.
        q.enqueue(update("e1", "unused"), 2).await.unwrap();

        let outcome = q.acknowledge(&sent.id, sent.revision, Some("srv-9")).await.unwrap();
        let AckOutcome::Retained(entry) = outcome else {
            panic!("expected retained entry, got {outcome:?}");
        };
        assert_eq!(entry.action, MutationAction::Update);
        assert_eq!(entry.endpoint, "/transactions/srv-9");
        assert_eq!(q.len().await.unwrap(), 1);
        assert!(q.in_flight().await.is_none());
    }

    #[tokio::test]
    async fn delete_while_create_in_flight() {
        let q = queue(10);
        q.enqueue(create("e1", Priority::High), 1).await.unwrap();
        let sent = q.dequeue_next(1).await.unwrap().unwrap();

        let outcome = q.cancel(EntityType::Transaction, &LocalId::from("e1")).await.unwrap();
        assert_eq!(outcome, CancelOutcome::Merged(sent.id.clone()));

        let AckOutcome::Retained(entry) = q.acknowledge(&sent.id, sent.revision, Some("srv-3")).await.unwrap()
        else {
            panic!("expected retained entry");
        };
        assert_eq!(entry.action, MutationAction::Delete);
        assert_eq!(entry.endpoint, "/transactions/srv-3");
    }

    #[tokio::test]
    async fn failed_create_with_pending_delete_is_dropped() {
        let q = queue(10);
        q.enqueue(create("e1", Priority::High), 1).await.unwrap();
        let mut sent = q.dequeue_next(1).await.unwrap().unwrap();
        q.cancel(EntityType::Transaction, &LocalId::from("e1")).await.unwrap();

        sent.retry_count = 1;
        assert!(q.requeue(&sent, 2).await.unwrap().is_none());
        assert!(q.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn requeue_moves_to_tail_of_band() {
        let q = queue(10);
        q.enqueue(create("a", Priority::High), 1).await.unwrap();
        q.enqueue(create("b", Priority::High), 2).await.unwrap();
        q.enqueue(create("z", Priority::Low), 0).await.unwrap();

        let mut first = q.dequeue_next(5).await.unwrap().unwrap();
        assert_eq!(first.local_id.as_str(), "a");
        first.retry_count = 1;
        first.last_error = Some("server error 500: boom".into());
        let requeued = q.requeue(&first, 5).await.unwrap().unwrap();
        assert_eq!(requeued.retry_count, 1);
        assert_eq!(requeued.enqueued_at, 5);

        assert_eq!(drain_ids(&q).await, vec!["b", "a", "z"]);
    }

    #[tokio::test]
    async fn backed_off_entries_are_skipped() {
        let q = queue(10);
        q.enqueue(create("a", Priority::High), 1).await.unwrap();
        q.enqueue(create("b", Priority::Low), 2).await.unwrap();

        let mut a = q.dequeue_next(10).await.unwrap().unwrap();
        a.retry_count = 1;
        a.not_before = Some(500);
        q.requeue(&a, 10).await.unwrap();

        let next = q.dequeue_next(10).await.unwrap().unwrap();
        assert_eq!(next.local_id.as_str(), "b");
        q.release(&next.id).await.unwrap();
        assert_eq!(q.next_wake().await.unwrap(), Some(500));

        q.remove(&next.id).await.unwrap();
        assert!(q.dequeue_next(499).await.unwrap().is_none());
        assert_eq!(q.dequeue_next(500).await.unwrap().unwrap().id, a.id);
    }

    #[tokio::test]
    async fn survives_reopen() {
        let store = Arc::new(InMemoryStore::new());
        {
            let q = PendingMutationQueue::new(Arc::clone(&store), 10);
            q.enqueue(create("a", Priority::Low), 1).await.unwrap();
            q.enqueue(create("b", Priority::High), 2).await.unwrap();
        }
        let q = PendingMutationQueue::new(store, 10);
        let ordered = q.list_in_drain_order().await.unwrap();
        let names: Vec<_> = ordered.iter().map(|m| m.local_id.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn store_failure_is_reported() {
        let store = Arc::new(InMemoryStore::new());
        let q = PendingMutationQueue::new(Arc::clone(&store), 10);
        store.set_failing(true);
        assert!(q.enqueue(create("a", Priority::Low), 1).await.is_err());
        store.set_failing(false);
        assert!(q.is_empty().await.unwrap());
    }

    fn priority_strategy() -> impl Strategy<Value = Priority> {
        prop_oneof![Just(Priority::Low), Just(Priority::Medium), Just(Priority::High)]
    }

    proptest! {
        #[test]
        fn drain_order_is_a_function_of_priority_and_time(
            entries in prop::collection::vec((priority_strategy(), 0u64..50), 1..30)
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let q = queue(100);
                for (i, (priority, at)) in entries.iter().enumerate() {
                    q.enqueue(create(&i.to_string(), *priority), *at).await.unwrap();
                }

                let mut expected: Vec<(usize, Priority, u64)> = entries
                    .iter()
                    .enumerate()
                    .map(|(i, (p, t))| (i, *p, *t))
                    .collect();
                expected.sort_by_key(|(i, p, t)| (Reverse(*p), *t, *i));
                let expected: Vec<String> = expected.iter().map(|(i, _, _)| i.to_string()).collect();

                prop_assert_eq!(drain_ids(&q).await, expected);
                Ok::<(), TestCaseError>(())
            })?;
        }
    }
}
