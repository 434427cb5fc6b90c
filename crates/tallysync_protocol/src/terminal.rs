//! Mutations that left the active queue for good.

use crate::mutation::PendingMutation;
use serde::{Deserialize, Serialize};

/// Why a mutation left the queue without being acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    /// The server rejected every replay; needs manual intervention.
    RetriesExhausted {
        /// Message of the final failure.
        last_error: String,
    },
    /// The queue was full and the mutation was evicted to make room.
    Evicted {
        /// Queue capacity at the time of eviction.
        capacity: usize,
    },
}

/// A mutation recorded in the stuck or eviction log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalMutation {
    /// The mutation as it was when it left the queue.
    pub mutation: PendingMutation,
    /// Why it left.
    pub reason: TerminalReason,
    /// When it left (Unix millis).
    pub recorded_at: u64,
}

impl TerminalMutation {
    /// Creates a record for a mutation whose retries are exhausted.
    pub fn stuck(mutation: PendingMutation, last_error: impl Into<String>, now: u64) -> Self {
        Self {
            mutation,
            reason: TerminalReason::RetriesExhausted {
                last_error: last_error.into(),
            },
            recorded_at: now,
        }
    }

    /// Creates a record for an evicted mutation.
    pub fn evicted(mutation: PendingMutation, capacity: usize, now: u64) -> Self {
        Self {
            mutation,
            reason: TerminalReason::Evicted { capacity },
            recorded_at: now,
        }
    }

    /// Returns true if this record is in the stuck log.
    pub fn is_stuck(&self) -> bool {
        matches!(self.reason, TerminalReason::RetriesExhausted { .. })
    }
}
