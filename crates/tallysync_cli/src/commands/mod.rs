//! CLI command implementations.

pub mod cache;
pub mod queue;
pub mod resolve;
pub mod status;
pub mod sync;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tallysync_engine::{HttpRemoteClient, StaticCredentials, SyncConfig, SyncEngine};
use tallysync_store::FileStore;

/// Engine over a store directory, replaying through HTTP.
pub type Engine = SyncEngine<FileStore, HttpRemoteClient<StaticCredentials>>;

/// Where the commands read and send.
pub struct Target {
    /// Store directory.
    pub store: PathBuf,
    /// Base URL of the remote API.
    pub server: String,
    /// Bearer token, if any.
    pub token: Option<String>,
}

impl Target {
    /// Opens the store directory.
    pub async fn open_store(&self) -> Result<Arc<FileStore>, Box<dyn std::error::Error>> {
        if !self.store.is_dir() {
            return Err(format!("No store found at {:?}", self.store).into());
        }
        Ok(Arc::new(FileStore::open(&self.store).await?))
    }

    /// Builds an engine over an opened store.
    pub fn engine(&self, store: Arc<FileStore>, timeout: Duration) -> Result<Engine, Box<dyn std::error::Error>> {
        let credentials = match &self.token {
            Some(token) => StaticCredentials::new(token.clone()),
            None => StaticCredentials::anonymous(),
        };
        let config = SyncConfig::new(self.server.clone()).with_request_timeout(timeout);
        let remote = Arc::new(HttpRemoteClient::from_config(&config, credentials)?);
        Ok(SyncEngine::new(config, store, remote))
    }

    /// Opens the store and builds an engine over it.
    pub async fn open(&self, timeout: Duration) -> Result<Engine, Box<dyn std::error::Error>> {
        let store = self.open_store().await?;
        self.engine(store, timeout)
    }
}

/// Formats a Unix-millis timestamp relative to `now`.
pub fn format_age(now: u64, then: u64) -> String {
    let secs = now.saturating_sub(then) / 1000;
    if secs < 60 {
        format!("{secs}s ago")
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else if secs < 86_400 {
        format!("{}h ago", secs / 3600)
    } else {
        format!("{}d ago", secs / 86_400)
    }
}

/// Prints `value` as pretty JSON.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
