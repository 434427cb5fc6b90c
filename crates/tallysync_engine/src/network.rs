//! Connectivity monitoring.
//!
//! The platform layer feeds raw connectivity signals into
//! [`NetworkMonitor::report`]. The monitor collapses them into edges: a
//! listener fires once per offline→online or online→offline transition,
//! never for a repeated signal.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Connectivity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// The backend is believed reachable.
    Online,
    /// The backend is believed unreachable.
    Offline,
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Connectivity::Online => "online",
            Connectivity::Offline => "offline",
        })
    }
}

type TransitionListener = Arc<dyn Fn(Connectivity) + Send + Sync>;

/// Tracks connectivity and raises one event per transition.
///
/// The sync worker consumes transitions through [`NetworkMonitor::subscribe`];
/// UI code may add its own callbacks with [`NetworkMonitor::on_transition`].
pub struct NetworkMonitor {
    state: watch::Sender<Connectivity>,
    listeners: RwLock<Vec<TransitionListener>>,
}

impl NetworkMonitor {
    /// Creates a monitor with the given initial state.
    pub fn new(initial: Connectivity) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            state,
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Creates a monitor that starts online.
    pub fn online() -> Self {
        Self::new(Connectivity::Online)
    }

    /// Creates a monitor that starts offline.
    pub fn offline() -> Self {
        Self::new(Connectivity::Offline)
    }

    /// Returns the current state.
    pub fn current(&self) -> Connectivity {
        *self.state.borrow()
    }

    /// Returns true if currently online.
    pub fn is_online(&self) -> bool {
        self.current() == Connectivity::Online
    }

    /// Feeds a connectivity signal.
    ///
    /// Returns true if the signal was an edge. Listeners and subscribers are
    /// only notified on edges.
    pub fn report(&self, connectivity: Connectivity) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == connectivity {
                false
            } else {
                *current = connectivity;
                true
            }
        });

        if changed {
            match connectivity {
                Connectivity::Online => info!("network: back online"),
                Connectivity::Offline => warn!("network: went offline"),
            }
            let listeners: Vec<TransitionListener> = self.listeners.read().clone();
            for listener in listeners {
                listener(connectivity);
            }
        }

        changed
    }

    /// Registers a callback fired once per transition.
    pub fn on_transition<F>(&self, callback: F)
    where
        F: Fn(Connectivity) + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(callback));
    }

    /// Returns a receiver that observes transitions.
    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.state.subscribe()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::online()
    }
}

impl fmt::Debug for NetworkMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkMonitor")
            .field("state", &self.current())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}
