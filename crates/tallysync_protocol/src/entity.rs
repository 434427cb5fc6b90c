//! Cached entities and local identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Prefix of every locally generated identifier.
///
/// Server-assigned ids never carry this prefix, so a temporary id can
/// never collide with a real one.
pub const LOCAL_ID_PREFIX: &str = "local_";

/// Identifier of a cached entity.
///
/// Entities created offline get a temporary id of the form
/// `local_<unix millis>_<random>`. Entities learned from the server may be
/// cached under any id.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalId(String);

impl LocalId {
    /// Generates a new temporary id.
    ///
    /// Combines the wall-clock time with a 122-bit random component, so ids
    /// stay unique across restarts even if the clock goes backwards.
    #[must_use]
    pub fn generate(now_millis: u64) -> Self {
        Self(format!(
            "{LOCAL_ID_PREFIX}{now_millis}_{}",
            Uuid::new_v4().simple()
        ))
    }

    /// Returns true if this id was generated locally.
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(LOCAL_ID_PREFIX)
    }

    /// Returns the textual form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocalId({})", self.0)
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for LocalId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for LocalId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A locally known copy of a domain entity.
///
/// `synced` is false from the moment of a local write until the server
/// acknowledges it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEntity<T> {
    /// Local identifier (temporary for offline-created entities).
    pub local_id: LocalId,
    /// Server-assigned identifier, once known.
    pub remote_id: Option<String>,
    /// Best-known state of the entity.
    pub payload: T,
    /// Whether the server has confirmed the current payload.
    pub synced: bool,
    /// Time of the last local or remote change (Unix millis).
    pub last_modified: u64,
}

impl<T> CachedEntity<T> {
    /// Creates an unsynced entity.
    pub fn unsynced(local_id: LocalId, payload: T, now: u64) -> Self {
        Self {
            local_id,
            remote_id: None,
            payload,
            synced: false,
            last_modified: now,
        }
    }

    /// Creates a synced entity known to the server under `remote_id`.
    pub fn synced(local_id: LocalId, remote_id: impl Into<String>, payload: T, now: u64) -> Self {
        Self {
            local_id,
            remote_id: Some(remote_id.into()),
            payload,
            synced: true,
            last_modified: now,
        }
    }
}
