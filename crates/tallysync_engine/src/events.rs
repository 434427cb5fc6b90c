//! Events raised by the sync engine.

use crate::state::{DrainReport, SyncState};
use parking_lot::RwLock;
use std::sync::Arc;
use tallysync_protocol::PendingMutation;

/// Something the engine wants collaborators to know.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The orchestrator moved to a new state.
    StateChanged(SyncState),
    /// The server rejected the credential. Raised once per aborted drain.
    SessionExpired,
    /// A mutation exhausted its retries and moved to the stuck log.
    MutationStuck(PendingMutation),
    /// A mutation was evicted from the full queue.
    MutationEvicted(PendingMutation),
    /// A create timed out; the server may or may not have applied it.
    AmbiguousWrite(PendingMutation),
    /// A drain ended.
    DrainFinished(DrainReport),
}

type Listener = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

/// Fan-out of [`SyncEvent`]s to registered callbacks.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<Listener>>,
}

impl EventBus {
    /// Creates a bus without listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener`.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Delivers `event` to every listener, in registration order.
    pub fn emit(&self, event: SyncEvent) {
        // Listeners may subscribe from inside a callback.
        let listeners: Vec<Listener> = self.listeners.read().clone();
        for listener in listeners {
            listener(&event);
        }
    }

    /// Returns the number of listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
