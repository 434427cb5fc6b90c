//! Sync command implementation.

use super::Target;
use std::time::Duration;
use tallysync_engine::{DrainOutcome, SyncEvent};
use tracing::{error, warn};

/// Drains the queue against the server once.
pub async fn run(target: &Target, timeout_secs: u64) -> Result<(), Box<dyn std::error::Error>> {
    let engine = target.open(Duration::from_secs(timeout_secs)).await?;
    engine.on_sync_event(|event| match event {
        SyncEvent::MutationStuck(m) => {
            error!(mutation_id = %m.id, endpoint = %m.endpoint, "mutation is stuck");
        }
        SyncEvent::AmbiguousWrite(m) => {
            warn!(mutation_id = %m.id, endpoint = %m.endpoint, "create timed out; outcome unknown");
        }
        _ => {}
    });

    let before = engine.pending_mutations().await?.len();
    println!("Syncing {} pending mutation(s) to {}", before, target.server);

    let report = engine.force_sync().await?;
    println!();
    println!("Succeeded: {}", report.succeeded);
    println!("Requeued:  {}", report.requeued);
    println!("Stuck:     {}", report.stuck);
    println!("Duration:  {:.2?}", report.duration);
    println!();

    match report.outcome {
        DrainOutcome::Completed => println!("Queue drained"),
        DrainOutcome::Backoff { next_attempt_at } => {
            let remaining = engine.pending_mutations().await?.len();
            println!("{remaining} mutation(s) backed off until {next_attempt_at}");
        }
        DrainOutcome::ConnectivityLost => {
            return Err(format!("Server unreachable at {}", target.server).into());
        }
        DrainOutcome::SessionExpired => {
            return Err("Session expired; supply a fresh --token".into());
        }
    }
    Ok(())
}
