//! Background drain worker.
//!
//! [`SyncEngine::start`] spawns a task that drains the queue whenever there
//! may be work to do:
//! - on an offline→online edge of the network monitor
//! - when a local write is submitted while online
//! - when the earliest backed-off mutation becomes eligible
//! - on every tick of the configured sync interval

use crate::error::SyncError;
use crate::network::Connectivity;
use crate::state::{DrainOutcome, SyncEngine};
use crate::transport::RemoteClient;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tallysync_store::KeyValueStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Handle of a running background worker.
#[derive(Debug)]
pub struct SyncWorker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SyncWorker {
    /// Stops the worker and waits for it to finish. A drain in progress
    /// completes its current request first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.handle.await {
            error!(error = %err, "sync worker panicked");
        }
    }

    /// Returns true if the worker task has ended.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl<S, R> SyncEngine<S, R>
where
    S: KeyValueStore + 'static,
    R: RemoteClient + 'static,
{
    /// Spawns the background worker on the current tokio runtime.
    ///
    /// If the monitor is online, the worker drains once right away to pick
    /// up mutations persisted by a previous session.
    pub fn start(self: &Arc<Self>) -> SyncWorker {
        let (shutdown, rx) = watch::channel(false);
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move { engine.run(rx).await });
        SyncWorker { shutdown, handle }
    }

    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut connectivity = self.network().subscribe();
        let mut interval = self.config().sync_interval.map(|period| {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        let mut backoff_until: Option<u64> = None;

        info!("sync worker started");
        if self.network().is_online() {
            self.run_drain(&mut backoff_until).await;
        }

        loop {
            let backoff = backoff_until.map(|at| Duration::from_millis(at.saturating_sub(self.now())));

            tokio::select! {
                _ = shutdown.changed() => break,

                changed = connectivity.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let now_online = *connectivity.borrow_and_update() == Connectivity::Online;
                    if now_online {
                        debug!("reconnected, draining");
                        self.run_drain(&mut backoff_until).await;
                    }
                }

                _ = self.wake.notified() => {
                    if self.network().is_online() {
                        self.run_drain(&mut backoff_until).await;
                    }
                }

                _ = async {
                    match backoff {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => pending::<()>().await,
                    }
                } => {
                    backoff_until = None;
                    if self.network().is_online() {
                        debug!("backoff elapsed, draining");
                        self.run_drain(&mut backoff_until).await;
                    }
                }

                _ = async {
                    match interval.as_mut() {
                        Some(interval) => {
                            interval.tick().await;
                        }
                        None => pending::<()>().await,
                    }
                } => {
                    if self.network().is_online() {
                        self.run_drain(&mut backoff_until).await;
                    }
                }
            }
        }

        info!("sync worker stopped");
    }

    async fn run_drain(&self, backoff_until: &mut Option<u64>) {
        match self.drain().await {
            Ok(report) => {
                *backoff_until = match report.outcome {
                    DrainOutcome::Backoff { next_attempt_at } => Some(next_attempt_at),
                    _ => None,
                };
            }
            Err(SyncError::InvalidStateTransition { .. }) => {
                debug!("drain already running");
            }
            Err(err) => {
                error!(error = %err, "background drain failed");
            }
        }
    }
}
