//! Schema-versioned persisted records.
//!
//! Everything the engine writes to its durable store is wrapped in a
//! [`Record`] carrying a `schema_version` and encoded as CBOR. Readers
//! refuse records from a newer schema instead of silently absorbing
//! unknown shapes, and upgrade older ones through [`upgrade`].

use crate::error::{CodecError, CodecResult};
use ciborium::value::Value;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Schema version written by this build.
pub const CURRENT_SCHEMA_VERSION: u16 = 1;

/// Envelope of a persisted value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<T> {
    /// Version of the schema `body` was written with.
    pub schema_version: u16,
    /// The persisted value.
    pub body: T,
}

/// Encodes `body` as a current-version record.
pub fn encode_record<T: Serialize>(body: &T) -> CodecResult<Vec<u8>> {
    let record = Record {
        schema_version: CURRENT_SCHEMA_VERSION,
        body,
    };
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(&record, &mut bytes)
        .map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(bytes)
}

/// Decodes a record, upgrading it to the current schema if needed.
///
/// # Errors
///
/// Returns [`CodecError::UnsupportedSchema`] for records from a newer
/// schema and [`CodecError::Decode`] for malformed bytes.
pub fn decode_record<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    let record: Record<Value> =
        ciborium::de::from_reader(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;

    if record.schema_version > CURRENT_SCHEMA_VERSION {
        return Err(CodecError::UnsupportedSchema {
            found: record.schema_version,
            supported: CURRENT_SCHEMA_VERSION,
        });
    }

    let body = upgrade(record.schema_version, record.body)?;
    body.deserialized()
        .map_err(|e| CodecError::Decode(e.to_string()))
}

/// Brings a body written with `version` up to [`CURRENT_SCHEMA_VERSION`].
fn upgrade(version: u16, body: Value) -> CodecResult<Value> {
    match version {
        CURRENT_SCHEMA_VERSION => Ok(body),
        found => Err(CodecError::UnsupportedSchema {
            found,
            supported: CURRENT_SCHEMA_VERSION,
        }),
    }
}
