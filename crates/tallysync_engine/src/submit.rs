//! Local writes submitted to the engine.

use serde_json::Value;
use tallysync_protocol::{EntityType, LocalId, MutationAction, Priority};

/// A local write to one entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Creates a new entity; the engine assigns its local id.
    Create {
        /// Entity state.
        payload: Value,
    },
    /// Replaces the state of a cached entity.
    Update {
        /// Target entity.
        local_id: LocalId,
        /// New entity state.
        payload: Value,
    },
    /// Deletes a cached entity.
    Delete {
        /// Target entity.
        local_id: LocalId,
    },
}

impl Mutation {
    /// Returns the action.
    pub fn action(&self) -> MutationAction {
        match self {
            Mutation::Create { .. } => MutationAction::Create,
            Mutation::Update { .. } => MutationAction::Update,
            Mutation::Delete { .. } => MutationAction::Delete,
        }
    }

    /// Returns the targeted entity, if it already exists.
    pub fn local_id(&self) -> Option<&LocalId> {
        match self {
            Mutation::Create { .. } => None,
            Mutation::Update { local_id, .. } | Mutation::Delete { local_id } => Some(local_id),
        }
    }

    /// Returns the payload, if any.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Mutation::Create { payload } | Mutation::Update { payload, .. } => Some(payload),
            Mutation::Delete { .. } => None,
        }
    }
}

/// Per-submission overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Overrides the entity type's default priority.
    pub priority: Option<Priority>,
    /// Overrides the configured retry budget.
    pub max_retries: Option<u32>,
}

impl SubmitOptions {
    /// Sets the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Sets the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Synchronous check run before a mutation touches the cache or queue.
///
/// A rejected mutation is never queued.
pub trait MutationValidator: Send + Sync {
    /// Returns a human-readable reason if `mutation` must be rejected.
    fn validate(&self, entity_type: EntityType, mutation: &Mutation) -> Result<(), String>;
}

/// Requires payloads to be JSON objects and local ids to be non-empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultValidator;

impl MutationValidator for DefaultValidator {
    fn validate(&self, entity_type: EntityType, mutation: &Mutation) -> Result<(), String> {
        if let Some(local_id) = mutation.local_id() {
            if local_id.as_str().is_empty() {
                return Err("local id must not be empty".into());
            }
        }
        match mutation.payload() {
            Some(Value::Object(_)) | None => Ok(()),
            Some(_) => Err(format!("{entity_type} payload must be a JSON object")),
        }
    }
}
