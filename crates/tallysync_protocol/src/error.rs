//! Error types for record encoding and decoding.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding persisted records.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The value could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// The bytes could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The record was written by a newer schema than this build supports.
    #[error("unsupported schema version {found} (supported up to {supported})")]
    UnsupportedSchema {
        /// Version found in the record.
        found: u16,
        /// Highest version this build understands.
        supported: u16,
    },

    /// A textual identifier did not parse.
    #[error("invalid {kind}: {value:?}")]
    InvalidIdentifier {
        /// What was being parsed.
        kind: &'static str,
        /// The offending input.
        value: String,
    },
}
