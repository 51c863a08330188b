//! Error types for reel-store

use thiserror::Error;

/// Errors raised by [`crate::ProjectStore`] implementations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Filesystem error while reading or writing the backing document
    #[error("storage io failed: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be encoded or decoded
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record failed a structural check before being written
    #[error("invalid project record {id}: {reason}")]
    InvalidRecord { id: String, reason: String },

    /// Background write task panicked or was cancelled
    #[error("write task failed: {0}")]
    Task(String),
}
