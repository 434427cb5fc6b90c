//! Error types for the sync engine.

use tallysync_protocol::{CodecError, EntityType, LocalId, MutationId};
use tallysync_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// Remote request failures are not errors at this level: the drain loop
/// absorbs them into its [`crate::DrainReport`]. A `SyncError` means the
/// engine itself could not do its job.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The durable store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A persisted record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The mutation was rejected before it reached the queue.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An update or delete targeted an entity the cache does not know.
    #[error("unknown {entity_type} entity {local_id}")]
    UnknownEntity {
        /// Entity type.
        entity_type: EntityType,
        /// Local identifier that was not found.
        local_id: LocalId,
    },

    /// Invalid state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// The mutation is not in the stuck log.
    #[error("mutation {0} is not stuck")]
    NotStuck(MutationId),

    /// The engine configuration is unusable.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Returns true if the caller's input was rejected, as opposed to the
    /// engine failing.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            SyncError::Validation(_) | SyncError::UnknownEntity { .. }
        )
    }
}
