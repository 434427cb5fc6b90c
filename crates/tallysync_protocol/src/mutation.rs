//! Pending mutations.

use crate::entity::LocalId;
use crate::error::CodecError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// HTTP-style verb of a remote request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    /// Read. Never queued in practice.
    Get,
    /// Create.
    Post,
    /// Replace.
    Put,
    /// Delete.
    Delete,
}

impl HttpMethod {
    /// Returns the canonical upper-case verb.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Returns true if replaying the request cannot create a second
    /// server-side effect.
    pub fn is_idempotent(&self) -> bool {
        !matches!(self, HttpMethod::Post)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of domain record a mutation targets.
///
/// Each entity type has its own REST resource and its own entity cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A financial transaction.
    Transaction,
    /// A budget.
    Budget,
    /// A savings goal.
    Goal,
    /// A category.
    Category,
    /// Anything else routed through the engine.
    Other,
}

impl EntityType {
    /// All entity types, in declaration order.
    pub const ALL: [EntityType; 5] = [
        EntityType::Transaction,
        EntityType::Budget,
        EntityType::Goal,
        EntityType::Category,
        EntityType::Other,
    ];

    /// Returns the lower-case name used in store keys and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Transaction => "transaction",
            EntityType::Budget => "budget",
            EntityType::Goal => "goal",
            EntityType::Category => "category",
            EntityType::Other => "other",
        }
    }

    /// Returns the REST collection path, e.g. `/transactions`.
    pub fn resource(&self) -> &'static str {
        match self {
            EntityType::Transaction => "/transactions",
            EntityType::Budget => "/budgets",
            EntityType::Goal => "/goals",
            EntityType::Category => "/categories",
            EntityType::Other => "/records",
        }
    }

    /// Returns the durable-store key of this type's entity cache.
    pub fn cache_key(&self) -> String {
        format!("cache_{}", self.as_str())
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|ty| ty.as_str() == s)
            .ok_or_else(|| CodecError::InvalidIdentifier {
                kind: "entity type",
                value: s.to_string(),
            })
    }
}

/// Drain priority. Higher priorities are replayed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Replayed last.
    Low,
    /// Default band.
    Medium,
    /// Replayed first.
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        })
    }
}

/// What a mutation does to its entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationAction {
    /// Entity was created locally.
    Create,
    /// Entity was modified locally.
    Update,
    /// Entity was deleted locally.
    Delete,
}

impl MutationAction {
    /// Returns the HTTP verb used to replay this action.
    pub fn method(&self) -> HttpMethod {
        match self {
            MutationAction::Create => HttpMethod::Post,
            MutationAction::Update => HttpMethod::Put,
            MutationAction::Delete => HttpMethod::Delete,
        }
    }

    /// Returns the endpoint for this action against `entity_type`.
    ///
    /// Creates target the collection; updates and deletes target the
    /// server-assigned id.
    pub fn endpoint(&self, entity_type: EntityType, remote_id: Option<&str>) -> String {
        match (self, remote_id) {
            (MutationAction::Create, _) | (_, None) => entity_type.resource().to_string(),
            (_, Some(id)) => format!("{}/{}", entity_type.resource(), id),
        }
    }
}

impl fmt::Display for MutationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MutationAction::Create => "create",
            MutationAction::Update => "update",
            MutationAction::Delete => "delete",
        })
    }
}

/// Unique identifier of a pending mutation.
///
/// Generated at enqueue time and also sent as the request's idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MutationId(String);

impl MutationId {
    /// Creates a new random mutation ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the textual form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MutationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MutationId {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(|uuid| Self(uuid.to_string()))
            .map_err(|_| CodecError::InvalidIdentifier {
                kind: "mutation id",
                value: s.to_string(),
            })
    }
}

/// A write operation not yet acknowledged by the remote service.
///
/// # Invariants
///
/// - While queued, `retry_count <= max_retries`
/// - At most one queued mutation references a given `(entity_type, local_id)`
/// - `revision` increases every time another local write is merged in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMutation {
    /// Unique mutation ID.
    pub id: MutationId,
    /// HTTP verb.
    pub method: HttpMethod,
    /// Logical resource path, e.g. `/transactions/42`.
    pub endpoint: String,
    /// Serialized JSON body, absent for deletes.
    pub payload: Option<String>,
    /// Targeted entity type.
    pub entity_type: EntityType,
    /// What the mutation does.
    pub action: MutationAction,
    /// Local identifier of the targeted entity.
    pub local_id: LocalId,
    /// Drain priority.
    pub priority: Priority,
    /// Enqueue timestamp (Unix millis), stamped by the queue.
    pub enqueued_at: u64,
    /// Failed replays so far.
    pub retry_count: u32,
    /// Failed replays tolerated before the mutation is declared stuck.
    pub max_retries: u32,
    /// Earliest time (Unix millis) the mutation may be replayed again.
    pub not_before: Option<u64>,
    /// Number of local writes merged into this mutation.
    pub revision: u32,
    /// Set when a create timed out and may or may not have reached the server.
    pub ambiguous: bool,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
}

impl PendingMutation {
    /// Creates a new mutation for `action` on the given entity.
    ///
    /// `remote_id` is the server id of the entity if it is already known;
    /// it selects the endpoint of updates and deletes.
    pub fn new(
        entity_type: EntityType,
        action: MutationAction,
        local_id: LocalId,
        remote_id: Option<&str>,
        payload: Option<String>,
    ) -> Self {
        Self {
            id: MutationId::new(),
            method: action.method(),
            endpoint: action.endpoint(entity_type, remote_id),
            payload,
            entity_type,
            action,
            local_id,
            priority: Priority::Medium,
            enqueued_at: 0,
            retry_count: 0,
            max_retries: 3,
            not_before: None,
            revision: 0,
            ambiguous: false,
            last_error: None,
        }
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Returns true if this mutation targets the given entity.
    pub fn targets(&self, entity_type: EntityType, local_id: &LocalId) -> bool {
        self.entity_type == entity_type && &self.local_id == local_id
    }

    /// Returns true if the mutation may be replayed at `now`.
    pub fn is_eligible(&self, now: u64) -> bool {
        self.not_before.map_or(true, |t| t <= now)
    }

    /// Returns true once `retry_count` has gone past `max_retries`.
    pub fn is_exhausted(&self) -> bool {
        self.retry_count > self.max_retries
    }

    /// Rewrites action, verb and endpoint, e.g. after the server assigned
    /// an id to an entity whose follow-up write is still queued.
    pub fn retarget(&mut self, action: MutationAction, remote_id: Option<&str>) {
        self.action = action;
        self.method = action.method();
        self.endpoint = action.endpoint(self.entity_type, remote_id);
    }
}
