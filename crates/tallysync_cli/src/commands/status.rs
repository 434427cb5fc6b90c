//! Status command implementation.

use super::{format_age, print_json, Target};
use serde::Serialize;
use std::time::Duration;
use std::sync::Arc;
use tallysync_engine::{Clock, EntityType, SystemClock};
use tallysync_store::KeyValueStore;

/// Overview of a store.
#[derive(Debug, Serialize)]
pub struct StatusResult {
    /// Store directory.
    pub store: String,
    /// Queued mutations.
    pub pending: usize,
    /// Queued mutations waiting out a backoff.
    pub backed_off: usize,
    /// Queued creates whose last send timed out.
    pub ambiguous: usize,
    /// Mutations in the stuck log.
    pub stuck: usize,
    /// Entries in the eviction log.
    pub evicted: usize,
    /// Unsynced cached entities per type.
    pub unsynced: Vec<(String, usize)>,
    /// Last time a drain emptied the queue (Unix millis).
    pub last_successful_sync: Option<u64>,
    /// Keys of the records in the store.
    pub records: Vec<String>,
}

/// Runs the status command.
pub async fn run(target: &Target, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = target.open_store().await?;
    let records = store.keys().await?;
    let engine = target.engine(Arc::clone(&store), Duration::from_secs(30))?;
    let now = SystemClock::new().now_millis();

    let pending = engine.pending_mutations().await?;
    let mut unsynced = Vec::new();
    for ty in EntityType::ALL {
        let count = engine.cache(ty).list_unsynced().await?.len();
        unsynced.push((ty.to_string(), count));
    }

    let result = StatusResult {
        store: target.store.display().to_string(),
        pending: pending.len(),
        backed_off: pending.iter().filter(|m| !m.is_eligible(now)).count(),
        ambiguous: pending.iter().filter(|m| m.ambiguous).count(),
        stuck: engine.stuck_records().await?.len(),
        evicted: engine.evicted_mutations().await?.len(),
        unsynced,
        last_successful_sync: engine.last_successful_sync().await?,
        records,
    };

    match format {
        "json" => print_json(&result)?,
        _ => print_text_output(&result, now),
    }
    Ok(())
}

fn print_text_output(result: &StatusResult, now: u64) {
    println!("tallysync Store Status");
    println!("======================");
    println!();
    println!("Store: {}", result.store);
    println!();
    println!("Queue:");
    println!("  Pending:    {}", result.pending);
    println!("  Backed off: {}", result.backed_off);
    println!("  Ambiguous:  {}", result.ambiguous);
    println!("  Stuck:      {}", result.stuck);
    println!("  Evicted:    {}", result.evicted);
    println!();
    println!("Unsynced entities:");
    for (ty, count) in &result.unsynced {
        println!("  {ty:<12} {count}");
    }
    println!();
    println!("Records: {}", result.records.join(", "));
    println!();
    match result.last_successful_sync {
        Some(at) => println!("Last successful sync: {}", format_age(now, at)),
        None => println!("Last successful sync: never"),
    }
}
