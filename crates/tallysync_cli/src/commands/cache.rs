//! Cache command implementation.

use super::{format_age, print_json, Target};
use std::time::Duration;
use tallysync_engine::{Clock, EntityType, SystemClock};

/// Lists the cached entities of `entity_type`.
pub async fn run(
    target: &Target,
    entity_type: EntityType,
    unsynced_only: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = target.open(Duration::from_secs(30)).await?;
    let cache = engine.cache(entity_type);
    let entities = if unsynced_only {
        cache.list_unsynced().await?
    } else {
        cache.list().await?
    };

    if format == "json" {
        return print_json(&entities);
    }
    if entities.is_empty() {
        println!("No cached {entity_type} entities");
        return Ok(());
    }

    let now = SystemClock::new().now_millis();
    for entity in &entities {
        let state = if entity.synced { "synced" } else { "pending" };
        let remote = entity.remote_id.as_deref().unwrap_or("-");
        println!(
            "{:<24} {:<24} {:<8} modified {}",
            entity.local_id.as_str(),
            remote,
            state,
            format_age(now, entity.last_modified)
        );
        println!("    {}", entity.payload);
    }
    Ok(())
}
