//! Constants used throughout the docmap library.
//!
//! This module provides central definitions for reserved field names and the
//! characters used to address nested fields.

/// Identity field of a stored document.
pub const ID_FIELD: &str = "_id";

/// Type discriminator stamped on every inserted document.
pub const TYPE_FIELD: &str = "_type";

/// Discriminator written for documents without a registered class.
pub const DEFAULT_TYPE: &str = "document";

/// Separator between the components of a field path.
pub const PATH_SEPARATOR: char = '.';

/// Path component standing for "some element of this collection".
pub const ELEMENT_PLACEHOLDER: &str = "$";

/// Reference token key naming the target collection.
pub const REF_COLLECTION: &str = "$ref";

/// Reference token key holding the target identity.
pub const REF_ID: &str = "$id";

/// Optional reference token key naming the target database.
pub const REF_DATABASE: &str = "$db";

/// Keyword list maintained by full-text documents.
pub const KEYWORDS_FIELD: &str = "_keywords";

/// Prefix of the lowercase shadow fields maintained by case-insensitive documents.
pub const CASE_INSENSITIVE_PREFIX: &str = "_ci_";

/// Joins a parent path and a child component.
pub fn join_path(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{parent}{PATH_SEPARATOR}{child}")
    }
}

/// Returns the path addressing any element of the collection at `path`.
pub fn element_path(path: &str) -> String {
    join_path(path, ELEMENT_PLACEHOLDER)
}
