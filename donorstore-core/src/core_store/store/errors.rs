/*
    errors.rs - Error types for the store subsystem

    Fatal errors (store open) abort the caller. Merge and write-ack errors
    are absorbed by the store: they are logged, never returned from put/get.
*/

use crate::core_session::TransportError;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in the store subsystem
#[derive(Debug, Error)]
pub enum StoreError {
    /// Collection could not be created or opened
    #[error("Failed to open store: {0}")]
    StoreOpen(String),

    /// A remote entry was malformed and has been dropped
    #[error("Merge error: {0}")]
    Merge(String),

    /// Propagation of a local write was not confirmed in time
    #[error("Write acknowledgement timed out after {timeout:?} ({entries} entries)")]
    WriteAckTimeout { entries: usize, timeout: Duration },

    /// Writer not admitted by the store's access policy
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Document is not a JSON object
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Storage I/O error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Corrupted data detected
    #[error("Corrupted data: {0}")]
    CorruptedData(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Fatal errors abort the calling workflow; the rest are diagnostics
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StoreError::StoreOpen(_) | StoreError::Storage(_) | StoreError::CorruptedData(_)
        )
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<TransportError> for StoreError {
    fn from(err: TransportError) -> Self {
        StoreError::Transport(err.to_string())
    }
}
