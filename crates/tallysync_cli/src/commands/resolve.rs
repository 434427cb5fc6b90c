//! Stuck-mutation resolution commands.

use super::Target;
use std::time::Duration;
use tallysync_protocol::MutationId;

/// Moves a stuck mutation back into the queue.
pub async fn retry(target: &Target, id: &MutationId) -> Result<(), Box<dyn std::error::Error>> {
    let engine = target.open(Duration::from_secs(30)).await?;
    if let Err(err) = engine.retry_stuck(id).await {
        if err.is_rejection() {
            eprintln!("The entity is no longer cached; use `tallysync discard-stuck {id}` instead");
        }
        return Err(err.into());
    }
    println!("Requeued {id}; run `tallysync sync` to replay it");
    Ok(())
}

/// Drops a stuck mutation for good.
pub async fn discard(target: &Target, id: &MutationId) -> Result<(), Box<dyn std::error::Error>> {
    let engine = target.open(Duration::from_secs(30)).await?;
    let mutation = engine.discard_stuck(id).await?;
    println!("Discarded {} {} {}", id, mutation.method, mutation.endpoint);
    Ok(())
}
