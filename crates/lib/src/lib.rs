//!
//! docmap: a change-tracking object layer over a schemaless document store.
//! This library maps stored documents to in-memory entities, tracks field-level mutations,
//! lazily resolves cross-document references and compiles mutations into minimal
//! partial-update commands.
//!
//! ## Core Concepts
//!
//! * **Session (`document::Session`)**: Owns every in-memory node of a document graph and the store handle used to persist it.
//! * **Entities (`document::EntityId`)**: A mapped document, either top-level or embedded. Entities keep a baseline (last known
//!   persisted state) plus pending assignments and removals.
//! * **Sets (`document::SetId`)**: Ordered collections mapping array-valued fields. Any change rewrites the whole field on save.
//! * **References (`reference::DbRef`)**: Tokens pointing at another stored document, resolved lazily on first access.
//! * **Stores (`store::Store`)**: The collaborator that executes inserts, partial updates, lookups and removals.
//! * **Registry (`registry::Registry`)**: Maps collection names to document classes that add behaviour (events, indexes,
//!   virtual properties) to entities.

pub mod classes;
pub mod connection;
pub mod constants;
pub mod document;
pub mod events;
pub mod properties;
pub mod reference;
pub mod registry;
pub mod store;

pub use document::{Assign, EntityId, NodeRef, Session, SetId, Slot};
pub use reference::DbRef;
pub use registry::{DocumentClass, Registry};
pub use store::{InMemoryStore, Store};

/// Result type used throughout the docmap library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the docmap library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured errors from the document graph
    #[error(transparent)]
    Document(document::DocumentError),

    /// Structured errors from the property accessor
    #[error(transparent)]
    Property(properties::PropertyError),

    /// Structured errors from the store layer
    #[error(transparent)]
    Store(store::StoreError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Document(_) => "document",
            Error::Property(_) => "properties",
            Error::Store(_) => "store",
            Error::Io(_) => "io",
            Error::Serialize(_) => "serialize",
        }
    }

    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Document(document_err) => document_err.is_not_found(),
            Error::Property(property_err) => property_err.is_undefined(),
            _ => false,
        }
    }

    /// Check if this error was raised by the document graph.
    pub fn is_document_error(&self) -> bool {
        matches!(self, Error::Document(_))
    }

    /// Check if this error rejects invalid input (field names, payloads, parents).
    pub fn is_validation_error(&self) -> bool {
        match self {
            Error::Document(document_err) => document_err.is_validation_error(),
            _ => false,
        }
    }

    /// Check if this error is related to references.
    pub fn is_reference_error(&self) -> bool {
        match self {
            Error::Document(document_err) => document_err.is_reference_error(),
            _ => false,
        }
    }

    /// Check if this error is raised by the property accessor.
    pub fn is_property_error(&self) -> bool {
        matches!(self, Error::Property(_))
    }

    /// Check if this error is store-related.
    pub fn is_store_error(&self) -> bool {
        matches!(self, Error::Store(_))
    }

    /// Check if this error indicates no store connection is available.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Error::Store(store_err) => store_err.is_connection_error(),
            _ => false,
        }
    }

    /// Check if this error is I/O related.
    pub fn is_io_error(&self) -> bool {
        match self {
            Error::Io(_) => true,
            Error::Store(store_err) => store_err.is_io_error(),
            _ => false,
        }
    }
}
