//! Error types for the outbox.

use crate::{KindName, RecordId, SchemaVersion};
use thiserror::Error;

/// All possible errors from the datastore and the sync queue.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Validation errors
    #[error("record kind not found: {0}")]
    KindNotFound(KindName),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("missing required field: {0}")]
    MissingRequiredField(String),

    #[error("type mismatch for field '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: String,
        got: String,
    },

    // Record errors
    #[error("record not found: {kind}/{id}")]
    RecordNotFound { kind: KindName, id: RecordId },

    #[error("record already exists: {kind}/{id}")]
    RecordAlreadyExists { kind: KindName, id: RecordId },

    #[error("invalid outbox entry {id}: {reason}")]
    InvalidEntry { id: RecordId, reason: String },

    // State errors
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("schema version mismatch: expected {expected}, got {actual}")]
    SchemaVersionMismatch {
        expected: SchemaVersion,
        actual: SchemaVersion,
    },

    /// Backend failure, including failures raised by change listeners.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type for outbox operations.
pub type Result<T> = std::result::Result<T, Error>;
