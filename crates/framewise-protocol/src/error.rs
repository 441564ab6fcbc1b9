//! Protocol error types.

use framewise_core::EventKind;
use serde_json::Value;
use thiserror::Error;

/// Result type for encoding operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Result type for decoding operations.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Errors that can occur while encoding an outbound message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Encoded message exceeds the frame limit.
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Failed to serialize message to JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors that can occur while decoding an inbound frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Frame is not a JSON object.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// Frame exceeds the frame limit.
    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Frame has no string `type` field.
    #[error("frame has no `type` field")]
    MissingType,

    /// Content does not validate against the schema of its kind.
    #[error("content of `{kind}` does not match its schema: {source}")]
    SchemaMismatch {
        /// Resolved kind of the frame.
        kind: EventKind,
        /// The raw content that failed to validate.
        content: Value,
        /// Underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    /// Returns the kind for schema mismatches, if known.
    pub fn kind(&self) -> Option<&EventKind> {
        match self {
            Self::SchemaMismatch { kind, .. } => Some(kind),
            _ => None,
        }
    }
}
