//! Error types for the document graph.
//!
//! These errors cover construction, mutation, reference resolution and the
//! save algorithm. Store failures are reported separately as
//! [`StoreError`](crate::store::StoreError) and pass through unchanged.

use thiserror::Error;

/// Structured errors raised by entities and sets.
#[non_exhaustive]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    /// Entity construction received something other than a JSON object.
    #[error("Invalid data provided to document in '{collection}': expected an object, found {found}")]
    InvalidDocumentData {
        collection: String,
        found: &'static str,
    },

    /// A parent link would point at a missing node or create a cycle.
    #[error("Invalid parent: {reason}")]
    InvalidParent { reason: String },

    /// Field names must not contain the path separator.
    #[error("The '.' character must not appear anywhere in the key name: '{field}'")]
    InvalidFieldName { field: String },

    /// Save reached a set with no owning entity.
    #[error("Invalid set at '{path}': a set must be owned by a document")]
    InvalidDocumentSet { path: String },

    /// Save was called on a node standing in for another document.
    #[error("Cannot save reference {reference}: it represents another document")]
    CannotSaveReference { reference: String },

    /// A reference points at a document that does not exist.
    #[error("Broken reference: {reference} does not resolve to a document")]
    BrokenReference { reference: String },

    /// A handle does not refer to a live node of the expected kind.
    #[error("No live {kind} for this handle")]
    NodeNotFound { kind: &'static str },

    /// Set index outside the collection.
    #[error("Index {index} out of bounds for set of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// The operation needs a persisted identity.
    #[error("Document in '{collection}' has no identity yet")]
    MissingIdentity { collection: String },
}

impl DocumentError {
    /// Check if this error indicates a missing node or document.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DocumentError::NodeNotFound { .. } | DocumentError::BrokenReference { .. }
        )
    }

    /// Check if this error rejects invalid input.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            DocumentError::InvalidDocumentData { .. }
                | DocumentError::InvalidParent { .. }
                | DocumentError::InvalidFieldName { .. }
                | DocumentError::InvalidDocumentSet { .. }
                | DocumentError::IndexOutOfBounds { .. }
        )
    }

    /// Check if this error is related to references.
    pub fn is_reference_error(&self) -> bool {
        matches!(
            self,
            DocumentError::CannotSaveReference { .. } | DocumentError::BrokenReference { .. }
        )
    }
}

// Conversion from DocumentError to the main Error type
impl From<DocumentError> for crate::Error {
    fn from(err: DocumentError) -> Self {
        crate::Error::Document(err)
    }
}
