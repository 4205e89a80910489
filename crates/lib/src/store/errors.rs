//! Error types for store operations.
//!
//! This module defines structured error types raised by the store collaborator
//! and by the process-wide connection handling.

use thiserror::Error;

/// Errors that can occur while talking to a document store.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StoreError {
    /// An operation needed the default store before any was initialised.
    #[error("No store connection available; call connection::init first")]
    MissingConnection,

    /// The connection URI names a backend this build cannot open.
    #[error("Unsupported store backend: {scheme}")]
    UnsupportedBackend {
        /// URI scheme that was requested
        scheme: String,
    },

    /// The connection URI could not be parsed.
    #[error("Invalid store URI '{uri}': {reason}")]
    InvalidUri {
        /// The rejected URI
        uri: String,
        /// Why it was rejected
        reason: String,
    },

    /// An insert carried an identity that already exists in the collection.
    #[error("Duplicate key {id} in collection '{collection}'")]
    DuplicateKey {
        /// The collection written to
        collection: String,
        /// The conflicting identity
        id: String,
    },

    /// Internal lock was poisoned by a panicking writer.
    #[error("Store lock poisoned: {what}")]
    LockPoisoned {
        /// Which structure was guarded by the lock
        what: &'static str,
    },

    /// File I/O error while persisting the store.
    #[error("Store file I/O error")]
    FileIo {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Store contents could not be (de)serialized.
    #[error("Store persistence failed")]
    Persistence {
        /// The underlying serialization error
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Check if this error means no usable connection exists.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            StoreError::MissingConnection
                | StoreError::UnsupportedBackend { .. }
                | StoreError::InvalidUri { .. }
        )
    }

    /// Check if this error is I/O related.
    pub fn is_io_error(&self) -> bool {
        matches!(
            self,
            StoreError::FileIo { .. } | StoreError::Persistence { .. }
        )
    }

    /// Check if this error is a uniqueness conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::DuplicateKey { .. })
    }
}

// Conversion from StoreError to the main Error type
impl From<StoreError> for crate::Error {
    fn from(err: StoreError) -> Self {
        crate::Error::Store(err)
    }
}
