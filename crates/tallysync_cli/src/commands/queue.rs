//! Queue inspection commands: pending, stuck and evicted mutations.

use super::{format_age, print_json, Target};
use std::time::Duration;
use tallysync_engine::{Clock, PendingMutation, SystemClock, TerminalMutation, TerminalReason};

/// Lists queued mutations in replay order.
pub async fn pending(target: &Target, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let engine = target.open(Duration::from_secs(30)).await?;
    let mutations = engine.pending_mutations().await?;

    if format == "json" {
        return print_json(&mutations);
    }
    if mutations.is_empty() {
        println!("Queue is empty");
        return Ok(());
    }

    let now = SystemClock::new().now_millis();
    println!("{} pending mutation(s), in replay order:", mutations.len());
    for m in &mutations {
        println!("  {}", describe(m, now));
        if let Some(at) = m.not_before.filter(|&at| at > now) {
            println!("      backed off for {}s", (at - now).div_ceil(1000));
        }
        if m.ambiguous {
            println!("      last send timed out; the server may already have it");
        }
        if let Some(err) = &m.last_error {
            println!("      last error: {err}");
        }
    }
    Ok(())
}

/// Lists the stuck log.
pub async fn stuck(target: &Target, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let engine = target.open(Duration::from_secs(30)).await?;
    let records = engine.stuck_records().await?;
    print_terminal(&records, format, "No stuck mutations")
}

/// Lists the eviction log.
pub async fn evicted(target: &Target, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let engine = target.open(Duration::from_secs(30)).await?;
    let records = engine.evicted_mutations().await?;
    print_terminal(&records, format, "No evicted mutations")
}

fn print_terminal(
    records: &[TerminalMutation],
    format: &str,
    empty: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if format == "json" {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("{empty}");
        return Ok(());
    }

    let now = SystemClock::new().now_millis();
    for record in records {
        println!("  {}", describe(&record.mutation, now));
        let reason = match &record.reason {
            TerminalReason::RetriesExhausted { last_error } => format!("gave up: {last_error}"),
            TerminalReason::Evicted { capacity } => format!("evicted from full queue ({capacity})"),
        };
        println!("      {reason}, {}", format_age(now, record.recorded_at));
    }
    Ok(())
}

fn describe(m: &PendingMutation, now: u64) -> String {
    format!(
        "{} {:<6} {:<28} [{}] retries {}/{} queued {}",
        m.id,
        m.method.as_str(),
        m.endpoint,
        m.priority,
        m.retry_count,
        m.max_retries,
        format_age(now, m.enqueued_at)
    )
}
