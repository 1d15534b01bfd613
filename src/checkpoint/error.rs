//! Checkpoint error types.

use thiserror::Error;

/// Errors that can occur while capturing, encoding or restoring snapshots
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Serialization to JSON or binary format failed
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Deserialization from JSON or binary format failed
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Snapshot version is not supported by this version
    #[error("Unsupported snapshot version {found}, supported: {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// Snapshot does not fit the machine model
    #[error("Snapshot validation failed: {0}")]
    ValidationFailed(String),

    /// The persister could not store the snapshot
    #[error("Persisting snapshot failed: {0}")]
    PersistFailed(String),
}
