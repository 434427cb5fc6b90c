//! # tallysync store
//!
//! Durable key-value store capability for the tallysync sync engine.
//!
//! The engine never talks to a concrete database. It persists its queue,
//! entity caches and sync metadata through the [`KeyValueStore`] trait,
//! which is a plain asynchronous string-keyed get/set/remove facility.
//! Values are **opaque bytes**; the store does not interpret them.
//!
//! ## Design Principles
//!
//! - Stores are simple key-value maps (get, set, remove)
//! - No knowledge of queue, cache or record formats
//! - Must be `Send + Sync` so one instance can back the whole engine
//! - No transactional primitives are assumed; callers serialize their
//!   own read-modify-write cycles
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral sessions
//! - [`FileStore`] - One file per key in a directory, replaced atomically
//!
//! ## Example
//!
//! ```rust
//! use tallysync_store::{InMemoryStore, KeyValueStore};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = InMemoryStore::new();
//! store.set("pending_mutations", b"[]".to_vec()).await.unwrap();
//! assert_eq!(store.get("pending_mutations").await.unwrap(), Some(b"[]".to_vec()));
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::KeyValueStore;
pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
