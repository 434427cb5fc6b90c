//! Sync engine state machine.

use crate::cache::{EntityCache, MarkSynced};
use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, SyncEvent};
use crate::metadata::MetadataStore;
use crate::network::{Connectivity, NetworkMonitor};
use crate::queue::{self, AckOutcome, CancelOutcome, EnqueueReport, PendingMutationQueue};
use crate::submit::{DefaultValidator, Mutation, MutationValidator, SubmitOptions};
use crate::transport::{RemoteClient, RemoteFailure, RemoteRequest, RemoteResponse};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tallysync_protocol::{
    CachedEntity, EntityType, LocalId, MutationAction, MutationId, PendingMutation, Priority,
    TerminalMutation,
};
use tallysync_store::KeyValueStore;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, info, warn};

/// The current state of the sync orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Nothing to do, or waiting for connectivity.
    Idle,
    /// Replaying queued mutations.
    Draining,
    /// Queued mutations remain, but none is eligible yet.
    Backoff,
}

impl SyncState {
    /// Returns true while a drain is running.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Draining)
    }

    /// Returns true if a new drain may start.
    pub fn can_start_drain(&self) -> bool {
        matches!(self, SyncState::Idle | SyncState::Backoff)
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Drains started.
    pub drains_started: u64,
    /// Drains that emptied the queue.
    pub drains_completed: u64,
    /// Mutations acknowledged by the server.
    pub mutations_synced: u64,
    /// Failed replays that were requeued.
    pub retries: u64,
    /// Mutations moved to the stuck log.
    pub mutations_stuck: u64,
    /// Mutations evicted from the full queue.
    pub mutations_evicted: u64,
    /// Creates that timed out with unknown outcome.
    pub ambiguous_writes: u64,
    /// Drains aborted by an expired session.
    pub session_expirations: u64,
    /// Last failure message.
    pub last_error: Option<String>,
}

/// Why a drain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The queue is empty.
    Completed,
    /// Only backed-off mutations remain; the earliest becomes eligible at
    /// `next_attempt_at` (Unix millis).
    Backoff {
        /// Earliest `not_before` in the queue.
        next_attempt_at: u64,
    },
    /// A request failed with `NetworkUnavailable` or `Timeout`.
    ConnectivityLost,
    /// The server rejected the credential.
    SessionExpired,
}

/// Result of a drain.
#[derive(Debug, Clone, PartialEq)]
pub struct DrainReport {
    /// Mutations acknowledged by the server.
    pub succeeded: usize,
    /// Failed mutations put back at the tail of their band.
    pub requeued: usize,
    /// Mutations moved to the stuck log.
    pub stuck: usize,
    /// Why the drain ended.
    pub outcome: DrainOutcome,
    /// Wall time of the drain.
    pub duration: Duration,
}

impl DrainReport {
    fn new() -> Self {
        Self {
            succeeded: 0,
            requeued: 0,
            stuck: 0,
            outcome: DrainOutcome::Completed,
            duration: Duration::ZERO,
        }
    }
}

enum Step {
    Continue,
    Stop(DrainOutcome),
}

/// The offline-first sync engine.
///
/// Local writes go to the entity cache and the pending mutation queue;
/// [`SyncEngine::drain`] replays the queue through the remote client one
/// mutation at a time.
pub struct SyncEngine<S: KeyValueStore, R: RemoteClient> {
    config: SyncConfig,
    remote: Arc<R>,
    queue: PendingMutationQueue<S>,
    caches: [EntityCache<S, Value>; 5],
    metadata: MetadataStore<S>,
    monitor: Arc<NetworkMonitor>,
    clock: Arc<dyn Clock>,
    validator: Arc<dyn MutationValidator>,
    events: EventBus,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    drain_lock: Mutex<()>,
    write_lock: Mutex<()>,
    pub(crate) wake: Notify,
}

impl<S, R> SyncEngine<S, R>
where
    S: KeyValueStore,
    R: RemoteClient,
{
    /// Creates an engine persisting into `store` and replaying through
    /// `remote`.
    ///
    /// The engine starts with an online [`NetworkMonitor`], the system
    /// clock and the [`DefaultValidator`].
    pub fn new(config: SyncConfig, store: Arc<S>, remote: Arc<R>) -> Self {
        let caches = EntityType::ALL.map(|ty| EntityCache::new(Arc::clone(&store), ty));
        Self {
            queue: PendingMutationQueue::new(Arc::clone(&store), config.queue_capacity),
            caches,
            metadata: MetadataStore::new(store),
            config,
            remote,
            monitor: Arc::new(NetworkMonitor::online()),
            clock: Arc::new(SystemClock::new()),
            validator: Arc::new(DefaultValidator),
            events: EventBus::new(),
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            drain_lock: Mutex::new(()),
            write_lock: Mutex::new(()),
            wake: Notify::new(),
        }
    }

    /// Uses `monitor` for connectivity.
    pub fn with_monitor(mut self, monitor: Arc<NetworkMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Uses `clock` for timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Uses `validator` to screen submissions.
    pub fn with_validator(mut self, validator: Arc<dyn MutationValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the network monitor the platform layer feeds.
    pub fn network(&self) -> &Arc<NetworkMonitor> {
        &self.monitor
    }

    /// Returns the pending mutation queue.
    pub fn queue(&self) -> &PendingMutationQueue<S> {
        &self.queue
    }

    /// Returns the entity cache of `entity_type`.
    pub fn cache(&self, entity_type: EntityType) -> &EntityCache<S, Value> {
        &self.caches[entity_type as usize]
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Registers a callback for [`SyncEvent`]s.
    pub fn on_sync_event<F>(&self, callback: F)
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(callback);
    }

    fn set_state(&self, state: SyncState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "sync state changed");
            self.events.emit(SyncEvent::StateChanged(state));
        }
    }

    pub(crate) fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    /// Submits a local write with the entity type's default options.
    ///
    /// See [`SyncEngine::submit_mutation_with`].
    pub async fn submit_mutation(&self, entity_type: EntityType, mutation: Mutation) -> SyncResult<LocalId> {
        self.submit_mutation_with(entity_type, mutation, SubmitOptions::default())
            .await
    }

    /// Submits a local write.
    ///
    /// The cache is updated optimistically and the write is queued for
    /// replay; the call never waits for the server. Returns the local id of
    /// the affected entity (newly generated for creates).
    ///
    /// # Errors
    ///
    /// - [`SyncError::Validation`] if the validator rejects the mutation
    /// - [`SyncError::UnknownEntity`] if an update or delete targets an
    ///   entity the cache does not hold
    pub async fn submit_mutation_with(
        &self,
        entity_type: EntityType,
        mutation: Mutation,
        options: SubmitOptions,
    ) -> SyncResult<LocalId> {
        self.validator
            .validate(entity_type, &mutation)
            .map_err(SyncError::Validation)?;

        let priority = options
            .priority
            .unwrap_or_else(|| self.config.priorities.priority_for(entity_type));
        let max_retries = options.max_retries.unwrap_or(self.config.default_max_retries);
        let cache = self.cache(entity_type);

        let _write = self.write_lock.lock().await;
        let now = self.now();

        let deleted = matches!(mutation, Mutation::Delete { .. });
        let (local_id, previous, pending) = match mutation {
            Mutation::Create { payload } => {
                let local_id = LocalId::generate(now);
                let body = payload.to_string();
                cache.upsert_local(local_id.clone(), payload, now).await?;
                let pending = PendingMutation::new(
                    entity_type,
                    MutationAction::Create,
                    local_id.clone(),
                    None,
                    Some(body),
                );
                (local_id, None, Some(pending))
            }
            Mutation::Update { local_id, payload } => {
                let entity = self.known_entity(entity_type, &local_id).await?;
                let body = payload.to_string();
                cache.upsert_local(local_id.clone(), payload, now).await?;
                // An entity the server has never seen is (re)created.
                let action = if entity.remote_id.is_some() {
                    MutationAction::Update
                } else {
                    MutationAction::Create
                };
                let pending = PendingMutation::new(
                    entity_type,
                    action,
                    local_id.clone(),
                    entity.remote_id.as_deref(),
                    Some(body),
                );
                (local_id, Some(entity), Some(pending))
            }
            Mutation::Delete { local_id } => {
                let entity = self.known_entity(entity_type, &local_id).await?;
                cache.remove(&local_id).await?;
                let pending = entity.remote_id.as_deref().map(|remote_id| {
                    PendingMutation::new(
                        entity_type,
                        MutationAction::Delete,
                        local_id.clone(),
                        Some(remote_id),
                        None,
                    )
                });
                (local_id, Some(entity), pending)
            }
        };

        let queued = self
            .queue_local_write(entity_type, &local_id, pending, priority, max_retries, now)
            .await;
        if let Err(err) = queued {
            self.roll_back_local_write(entity_type, &local_id, previous).await;
            return Err(err);
        }
        if deleted {
            self.clear_stuck_writes(entity_type, &local_id).await?;
        }
        drop(_write);

        if self.monitor.is_online() {
            self.wake.notify_one();
        }
        Ok(local_id)
    }

    async fn queue_local_write(
        &self,
        entity_type: EntityType,
        local_id: &LocalId,
        pending: Option<PendingMutation>,
        priority: Priority,
        max_retries: u32,
        now: u64,
    ) -> SyncResult<()> {
        match pending {
            Some(pending) => {
                let pending = pending.with_priority(priority).with_max_retries(max_retries);
                let report = self.queue.enqueue(pending, now).await?;
                self.handle_eviction(report, now).await?;
            }
            // Delete of an entity the server never saw.
            None => {
                match self.queue.cancel(entity_type, local_id).await? {
                    CancelOutcome::Cancelled(id) => {
                        debug!(mutation_id = %id, "delete cancelled unsent create")
                    }
                    CancelOutcome::Merged(id) => {
                        debug!(mutation_id = %id, "delete merged into in-flight create")
                    }
                    CancelOutcome::NotQueued => {}
                }
            }
        }
        Ok(())
    }

    /// Drops stuck creates and updates of an entity that was deleted locally.
    async fn clear_stuck_writes(&self, entity_type: EntityType, local_id: &LocalId) -> SyncResult<()> {
        for record in self.metadata.remove_stuck_writes(entity_type, local_id).await? {
            debug!(mutation_id = %record.mutation.id, "stuck write dropped by delete");
        }
        Ok(())
    }

    /// Restores the cache after a local write could not be queued.
    async fn roll_back_local_write(
        &self,
        entity_type: EntityType,
        local_id: &LocalId,
        previous: Option<CachedEntity<Value>>,
    ) {
        let cache = self.cache(entity_type);
        let result = match previous {
            Some(entity) => cache.upsert(entity).await,
            None => cache.remove(local_id).await.map(|_| ()),
        };
        if let Err(err) = result {
            warn!(local_id = %local_id, error = %err, "failed to roll back local write");
        }
    }

    async fn known_entity(
        &self,
        entity_type: EntityType,
        local_id: &LocalId,
    ) -> SyncResult<CachedEntity<Value>> {
        self.cache(entity_type)
            .get(local_id)
            .await?
            .ok_or_else(|| SyncError::UnknownEntity {
                entity_type,
                local_id: local_id.clone(),
            })
    }

    async fn handle_eviction(&self, report: EnqueueReport, now: u64) -> SyncResult<()> {
        if let Some(evicted) = report.evicted {
            self.metadata
                .record_evicted(TerminalMutation::evicted(
                    evicted.clone(),
                    self.queue.capacity(),
                    now,
                ))
                .await?;
            self.stats.write().mutations_evicted += 1;
            self.events.emit(SyncEvent::MutationEvicted(evicted));
        }
        Ok(())
    }

    /// Returns the cached entities of `entity_type`.
    pub async fn cached_entities(&self, entity_type: EntityType) -> SyncResult<Vec<CachedEntity<Value>>> {
        self.cache(entity_type).list().await
    }

    /// Returns the queued mutations in replay order.
    pub async fn pending_mutations(&self) -> SyncResult<Vec<PendingMutation>> {
        self.queue.list_in_drain_order().await
    }

    /// Returns the mutations whose retries are exhausted.
    pub async fn stuck_mutations(&self) -> SyncResult<Vec<PendingMutation>> {
        Ok(self
            .metadata
            .load()
            .await?
            .stuck
            .into_iter()
            .map(|record| record.mutation)
            .collect())
    }

    /// Returns the stuck log with failure reasons.
    pub async fn stuck_records(&self) -> SyncResult<Vec<TerminalMutation>> {
        Ok(self.metadata.load().await?.stuck)
    }

    /// Returns the most recent evictions, oldest first.
    pub async fn evicted_mutations(&self) -> SyncResult<Vec<TerminalMutation>> {
        Ok(self.metadata.load().await?.evicted)
    }

    /// Returns when a drain last emptied the queue (Unix millis).
    pub async fn last_successful_sync(&self) -> SyncResult<Option<u64>> {
        Ok(self.metadata.load().await?.last_successful_sync)
    }

    /// Moves a stuck mutation back into the queue with a fresh retry budget.
    ///
    /// Creates and updates are rebuilt from the cached entity, so local
    /// edits made while the mutation was stuck are sent instead of the
    /// stale payload.
    ///
    /// # Errors
    ///
    /// - [`SyncError::NotStuck`] if `id` is not in the stuck log
    /// - [`SyncError::UnknownEntity`] if the entity of a stuck create or
    ///   update is no longer cached; the record stays in the stuck log
    pub async fn retry_stuck(&self, id: &MutationId) -> SyncResult<()> {
        let _write = self.write_lock.lock().await;
        let record = self
            .metadata
            .load()
            .await?
            .stuck
            .into_iter()
            .find(|record| &record.mutation.id == id)
            .ok_or_else(|| SyncError::NotStuck(id.clone()))?;

        let mut mutation = record.mutation;
        if mutation.action != MutationAction::Delete {
            let entity = self.known_entity(mutation.entity_type, &mutation.local_id).await?;
            let action = if entity.remote_id.is_some() {
                MutationAction::Update
            } else {
                MutationAction::Create
            };
            mutation.retarget(action, entity.remote_id.as_deref());
            mutation.payload = Some(entity.payload.to_string());
        }
        mutation.retry_count = 0;
        mutation.not_before = None;
        mutation.last_error = None;
        mutation.ambiguous = false;

        let now = self.now();
        let report = self.queue.enqueue(mutation, now).await?;
        self.metadata.take_stuck(id).await?;
        info!(mutation_id = %id, "stuck mutation requeued");
        self.handle_eviction(report, now).await?;
        drop(_write);

        if self.monitor.is_online() {
            self.wake.notify_one();
        }
        Ok(())
    }

    /// Drops a stuck mutation for good and returns it.
    pub async fn discard_stuck(&self, id: &MutationId) -> SyncResult<PendingMutation> {
        let record = self
            .metadata
            .take_stuck(id)
            .await?
            .ok_or_else(|| SyncError::NotStuck(id.clone()))?;
        info!(mutation_id = %id, "stuck mutation discarded");
        Ok(record.mutation)
    }

    /// Drains the queue now, regardless of connectivity state.
    pub async fn force_sync(&self) -> SyncResult<DrainReport> {
        info!("manual sync requested");
        self.drain().await
    }

    /// Replays queued mutations one at a time until the queue is empty, only
    /// backed-off mutations remain, or a failure stops the drain.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidStateTransition`] if a drain is already
    /// running. Remote failures are not errors; they end up in the report.
    pub async fn drain(&self) -> SyncResult<DrainReport> {
        let Ok(_drain) = self.drain_lock.try_lock() else {
            return Err(SyncError::InvalidStateTransition {
                from: format!("{:?}", self.state()),
                to: format!("{:?}", SyncState::Draining),
            });
        };

        let start = Instant::now();
        self.stats.write().drains_started += 1;
        self.set_state(SyncState::Draining);
        info!("drain started");

        let mut report = DrainReport::new();
        let result = self.drain_queue(&mut report).await;
        report.duration = start.elapsed();

        match result {
            Ok(outcome) => {
                report.outcome = outcome;
                if outcome == DrainOutcome::Completed {
                    self.metadata.set_last_sync(self.now()).await?;
                    self.stats.write().drains_completed += 1;
                }
                self.set_state(match outcome {
                    DrainOutcome::Backoff { .. } => SyncState::Backoff,
                    _ => SyncState::Idle,
                });
                info!(
                    succeeded = report.succeeded,
                    requeued = report.requeued,
                    stuck = report.stuck,
                    outcome = ?outcome,
                    "drain finished"
                );
                self.events.emit(SyncEvent::DrainFinished(report.clone()));
                Ok(report)
            }
            Err(err) => {
                error!(error = %err, "drain aborted");
                self.stats.write().last_error = Some(err.to_string());
                self.set_state(SyncState::Idle);
                Err(err)
            }
        }
    }

    async fn drain_queue(&self, report: &mut DrainReport) -> SyncResult<DrainOutcome> {
        loop {
            let now = self.now();
            let Some(mutation) = self.queue.dequeue_next(now).await? else {
                return Ok(match self.queue.next_wake().await? {
                    Some(next_attempt_at) => DrainOutcome::Backoff { next_attempt_at },
                    None => DrainOutcome::Completed,
                });
            };

            debug!(
                mutation_id = %mutation.id,
                method = %mutation.method,
                endpoint = %mutation.endpoint,
                attempt = mutation.retry_count + 1,
                "replaying mutation"
            );

            let result = self.remote.send(RemoteRequest::from_mutation(&mutation)).await;
            let failure = match result {
                Ok(response) => match self.reconcile(&mutation, response).await? {
                    Ok(()) => {
                        report.succeeded += 1;
                        self.stats.write().mutations_synced += 1;
                        continue;
                    }
                    Err(failure) => failure,
                },
                Err(failure) => failure,
            };

            match self.handle_failure(mutation, failure, report).await? {
                Step::Continue => {}
                Step::Stop(outcome) => return Ok(outcome),
            }
        }
    }

    /// Applies a successful response to the queue and the cache.
    ///
    /// A create whose response carries no id cannot be reconciled and is
    /// turned into a server error.
    async fn reconcile(
        &self,
        mutation: &PendingMutation,
        response: RemoteResponse,
    ) -> SyncResult<Result<(), RemoteFailure>> {
        let remote_id = response.remote_id();
        if mutation.action == MutationAction::Create && remote_id.is_none() {
            return Ok(Err(RemoteFailure::ServerError {
                status: response.status,
                message: "create response carried no id".into(),
            }));
        }

        let _write = self.write_lock.lock().await;
        let now = self.now();
        let cache = self.cache(mutation.entity_type);

        let ack = self
            .queue
            .acknowledge(&mutation.id, mutation.revision, remote_id.as_deref())
            .await?;

        if let AckOutcome::Retained(entry) = ack {
            debug!(
                mutation_id = %entry.id,
                action = %entry.action,
                "local changes made during replay remain queued"
            );
            if let Some(remote_id) = &remote_id {
                cache.attach_remote_id(&mutation.local_id, remote_id).await?;
            }
            return Ok(Ok(()));
        }

        if mutation.action == MutationAction::Delete {
            cache.remove(&mutation.local_id).await?;
            return Ok(Ok(()));
        }

        let remote_id = match remote_id {
            Some(id) => Some(id),
            None => cache
                .get(&mutation.local_id)
                .await?
                .and_then(|entity| entity.remote_id),
        };
        let Some(remote_id) = remote_id else {
            debug!(local_id = %mutation.local_id, "acknowledged entity no longer cached");
            return Ok(Ok(()));
        };

        let marked = match response.body {
            Some(Value::Object(server)) => {
                // Server fields win; fields the server did not echo are kept.
                let merged = match cache.get(&mutation.local_id).await? {
                    Some(CachedEntity {
                        payload: Value::Object(mut local),
                        ..
                    }) => {
                        local.extend(server);
                        Value::Object(local)
                    }
                    _ => Value::Object(server),
                };
                cache
                    .mark_synced_with_state(&mutation.local_id, &remote_id, merged, now)
                    .await?
            }
            _ => cache.mark_synced(&mutation.local_id, &remote_id, now).await?,
        };
        if marked == MarkSynced::AlreadySynced {
            debug!(local_id = %mutation.local_id, "duplicate acknowledgement ignored");
        }
        Ok(Ok(()))
    }

    async fn handle_failure(
        &self,
        mutation: PendingMutation,
        failure: RemoteFailure,
        report: &mut DrainReport,
    ) -> SyncResult<Step> {
        self.stats.write().last_error = Some(failure.to_string());

        match failure {
            RemoteFailure::NetworkUnavailable(ref reason) => {
                warn!(mutation_id = %mutation.id, reason = %reason, "network unavailable, pausing drain");
                self.queue.release(&mutation.id).await?;
                self.monitor.report(Connectivity::Offline);
                Ok(Step::Stop(DrainOutcome::ConnectivityLost))
            }
            RemoteFailure::Timeout if !mutation.method.is_idempotent() => {
                warn!(
                    mutation_id = %mutation.id,
                    endpoint = %mutation.endpoint,
                    "create timed out, outcome unknown"
                );
                let mut flagged = mutation;
                flagged.ambiguous = true;
                self.stats.write().ambiguous_writes += 1;
                self.events.emit(SyncEvent::AmbiguousWrite(flagged.clone()));
                self.count_failure(flagged, &failure, report).await?;
                self.monitor.report(Connectivity::Offline);
                Ok(Step::Stop(DrainOutcome::ConnectivityLost))
            }
            RemoteFailure::Timeout => {
                warn!(mutation_id = %mutation.id, "request timed out, pausing drain");
                self.count_failure(mutation, &failure, report).await?;
                self.monitor.report(Connectivity::Offline);
                Ok(Step::Stop(DrainOutcome::ConnectivityLost))
            }
            RemoteFailure::Unauthorized => {
                warn!(mutation_id = %mutation.id, "session expired, aborting drain");
                self.queue.release(&mutation.id).await?;
                self.stats.write().session_expirations += 1;
                self.events.emit(SyncEvent::SessionExpired);
                Ok(Step::Stop(DrainOutcome::SessionExpired))
            }
            RemoteFailure::ServerError { .. } => {
                self.count_failure(mutation, &failure, report).await?;
                Ok(Step::Continue)
            }
        }
    }

    /// Spends one retry of `mutation`: requeues it with backoff, or moves it
    /// to the stuck log once its budget is exhausted.
    async fn count_failure(
        &self,
        mutation: PendingMutation,
        failure: &RemoteFailure,
        report: &mut DrainReport,
    ) -> SyncResult<()> {
        let now = self.now();
        let message = failure.to_string();
        let mut failed = mutation;
        failed.retry_count += 1;
        failed.last_error = Some(message.clone());

        if !failed.is_exhausted() {
            let delay = self.config.retry.delay_for_attempt(failed.retry_count);
            failed.not_before = (!delay.is_zero()).then(|| now + delay.as_millis() as u64);
            debug!(
                mutation_id = %failed.id,
                retry_count = failed.retry_count,
                max_retries = failed.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %message,
                "mutation failed, requeued"
            );
            self.queue.requeue(&failed, now).await?;
            report.requeued += 1;
            self.stats.write().retries += 1;
            return Ok(());
        }

        let Some(mut stuck) = self.queue.remove(&failed.id).await? else {
            return Ok(());
        };
        if queue::is_unaddressed_delete(&stuck) {
            debug!(mutation_id = %stuck.id, "dropping delete of entity that was never created");
            return Ok(());
        }
        stuck.retry_count = failed.retry_count;
        stuck.last_error = failed.last_error;
        stuck.not_before = None;

        error!(
            mutation_id = %stuck.id,
            entity_type = %stuck.entity_type,
            endpoint = %stuck.endpoint,
            retry_count = stuck.retry_count,
            error = %message,
            "mutation exhausted its retries"
        );
        self.metadata
            .record_stuck(TerminalMutation::stuck(stuck.clone(), message, now))
            .await?;
        report.stuck += 1;
        self.stats.write().mutations_stuck += 1;
        self.events.emit(SyncEvent::MutationStuck(stuck));
        Ok(())
    }
}

impl<S: KeyValueStore, R: RemoteClient> std::fmt::Debug for SyncEngine<S, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("state", &self.state())
            .field("monitor", &self.monitor)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}
