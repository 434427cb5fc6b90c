//! # tallysync protocol
//!
//! Data types shared by the tallysync engine and its tools.
//!
//! This crate provides:
//! - [`PendingMutation`], the unit of work in the pending mutation queue
//! - [`CachedEntity`], a locally known copy of a domain entity
//! - [`TerminalMutation`], a mutation that left the queue for good
//!   (retries exhausted or evicted)
//! - A schema-versioned CBOR envelope for everything that is persisted
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entity;
mod error;
mod mutation;
mod record;
mod terminal;

pub use entity::{CachedEntity, LocalId, LOCAL_ID_PREFIX};
pub use error::{CodecError, CodecResult};
pub use mutation::{EntityType, HttpMethod, MutationAction, MutationId, PendingMutation, Priority};
pub use record::{decode_record, encode_record, Record, CURRENT_SCHEMA_VERSION};
pub use terminal::{TerminalMutation, TerminalReason};
