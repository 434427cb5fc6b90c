//! # tallysync engine
//!
//! Offline-first synchronization engine for a personal-finance client.
//!
//! This crate provides:
//! - Network monitor (one event per connectivity edge)
//! - Remote request client abstraction with an HTTP implementation
//! - Durable, bounded, priority-ordered pending mutation queue
//! - Per-entity-type caches with temporary local ids
//! - Sync orchestrator (idle → draining → idle/backoff) and background worker
//!
//! ## Architecture
//!
//! Every local write takes the same path:
//! 1. Update the entity cache optimistically (unsynced)
//! 2. Queue the write as a [`PendingMutation`]
//! 3. Replay the queue sequentially once the backend is reachable
//!
//! A successful replay removes the queue entry and marks the cached entity
//! synced under its server id. Failures are classified by the remote
//! client and handled by the orchestrator alone.
//!
//! ## Key Invariants
//!
//! - Mutations are replayed one at a time, highest priority first, oldest
//!   first within a priority
//! - At most one queued mutation per entity
//! - A mutation is never dropped silently: it is acknowledged, evicted
//!   (logged), or moved to the stuck log
//! - `Unauthorized` is never retried
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use tallysync_engine::{MockRemote, Mutation, SyncConfig, SyncEngine};
//! use tallysync_protocol::EntityType;
//! use tallysync_store::InMemoryStore;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let engine = SyncEngine::new(
//!     SyncConfig::new("https://api.example.com"),
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(MockRemote::new()),
//! );
//!
//! let id = engine
//!     .submit_mutation(EntityType::Transaction, Mutation::Create { payload: json!({"amount": 4.2}) })
//!     .await
//!     .unwrap();
//! engine.force_sync().await.unwrap();
//!
//! let cached = engine.cached_entities(EntityType::Transaction).await.unwrap();
//! assert!(cached.iter().any(|e| e.local_id == id && e.synced));
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod clock;
mod config;
mod error;
mod events;
mod http;
mod metadata;
mod network;
mod queue;
mod records;
mod state;
mod submit;
mod transport;
mod worker;

pub use cache::{EntityCache, MarkSynced};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{PriorityPolicy, RetryConfig, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use events::{EventBus, SyncEvent};
pub use http::{CredentialStore, HttpRemoteClient, StaticCredentials};
pub use metadata::{MetadataStore, SyncMetadata, EVICTION_LOG_LIMIT, METADATA_KEY};
pub use network::{Connectivity, NetworkMonitor};
pub use queue::{AckOutcome, CancelOutcome, EnqueueOutcome, EnqueueReport, PendingMutationQueue, QUEUE_KEY};
pub use state::{DrainOutcome, DrainReport, SyncEngine, SyncState, SyncStats};
pub use submit::{DefaultValidator, Mutation, MutationValidator, SubmitOptions};
pub use tallysync_protocol::{
    CachedEntity, EntityType, HttpMethod, LocalId, MutationAction, MutationId, PendingMutation,
    Priority, TerminalMutation, TerminalReason,
};
pub use transport::{
    MockRemote, RemoteClient, RemoteFailure, RemoteRequest, RemoteResponse, RemoteResult,
    RequestOptions,
};
pub use worker::SyncWorker;
