//! tallysync CLI
//!
//! Operator tools for a tallysync store directory.
//!
//! # Commands
//!
//! - `status` - Show queue size, stuck count and last successful sync
//! - `pending` - List queued mutations in replay order
//! - `stuck` - List mutations whose retries are exhausted
//! - `evicted` - List mutations dropped from a full queue
//! - `cache` - List the cached entities of one type
//! - `sync` - Drain the queue against the server
//! - `retry-stuck` / `discard-stuck` - Resolve a stuck mutation

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tallysync_protocol::{EntityType, MutationId};
use tracing_subscriber::EnvFilter;

/// tallysync command-line tools.
#[derive(Parser)]
#[command(name = "tallysync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long, env = "TALLYSYNC_STORE")]
    store: Option<PathBuf>,

    /// Base URL of the remote API
    #[arg(
        global = true,
        long,
        env = "TALLYSYNC_SERVER",
        default_value = "http://localhost:8080/api"
    )]
    server: String,

    /// Bearer token for the remote API
    #[arg(global = true, long, env = "TALLYSYNC_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show queue size, stuck count and last successful sync
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List queued mutations in replay order
    Pending {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List mutations whose retries are exhausted
    Stuck {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List mutations dropped from a full queue
    Evicted {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List the cached entities of one type
    Cache {
        /// Entity type (transaction, budget, goal, category, other)
        entity_type: EntityType,

        /// Only show entities not yet confirmed by the server
        #[arg(short, long)]
        unsynced: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Drain the queue against the server
    Sync {
        /// Per-request timeout in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,
    },

    /// Move a stuck mutation back into the queue
    RetryStuck {
        /// Mutation id
        id: MutationId,
    },

    /// Drop a stuck mutation for good
    DiscardStuck {
        /// Mutation id
        id: MutationId,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Commands::Version = cli.command {
        println!("tallysync CLI v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let store = cli.store.ok_or("Store path required (--store or TALLYSYNC_STORE)")?;
    let target = commands::Target {
        store,
        server: cli.server,
        token: cli.token,
    };

    match cli.command {
        Commands::Status { format } => commands::status::run(&target, &format).await?,
        Commands::Pending { format } => commands::queue::pending(&target, &format).await?,
        Commands::Stuck { format } => commands::queue::stuck(&target, &format).await?,
        Commands::Evicted { format } => commands::queue::evicted(&target, &format).await?,
        Commands::Cache {
            entity_type,
            unsynced,
            format,
        } => commands::cache::run(&target, entity_type, unsynced, &format).await?,
        Commands::Sync { timeout } => commands::sync::run(&target, timeout).await?,
        Commands::RetryStuck { id } => commands::resolve::retry(&target, &id).await?,
        Commands::DiscardStuck { id } => commands::resolve::discard(&target, &id).await?,
        Commands::Version => {}
    }

    Ok(())
}
