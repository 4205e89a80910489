//! Store collaborator for docmap.
//!
//! The [`Store`] trait is the boundary between the document graph and the
//! underlying document database. The graph only ever issues single-document
//! operations: insert a full document, apply a `$set`/`$unset` partial update,
//! fetch a document by reference, remove by filter. Connection management is
//! reduced to one idempotent [`Store::ensure_connected`] call.
//!
//! [`InMemoryStore`] implements the contract on top of in-process maps, with
//! optional JSON persistence, and is used by the CLI and the test-suite.

use std::any::Any;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Result, reference::DbRef};

pub mod errors;
pub mod in_memory;

pub use errors::StoreError;
pub use in_memory::InMemoryStore;

/// A stored document: a JSON object.
pub type Document = Map<String, Value>;

/// Equality filter on top-level fields. An empty filter matches every document.
///
/// A scalar clause also matches an array field containing it.
pub type Filter = Map<String, Value>;

/// Builds the filter selecting a document by identity.
pub fn id_filter(id: &Value) -> Filter {
    let mut filter = Filter::new();
    filter.insert(crate::constants::ID_FIELD.to_string(), id.clone());
    filter
}

/// Returns true if `document` satisfies every clause of `filter`.
pub fn matches(document: &Document, filter: &Filter) -> bool {
    filter
        .iter()
        .all(|(field, expected)| match document.get(field) {
            Some(Value::Array(items)) if !expected.is_array() => items.contains(expected),
            found => found == Some(expected),
        })
}

/// Partial update command compiled from an entity's pending state.
///
/// Serializes to `{"$set": {..}, "$unset": {..}}`, omitting either key when empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateCommand {
    /// Fields to overwrite
    #[serde(rename = "$set", default, skip_serializing_if = "Map::is_empty")]
    pub set: Map<String, Value>,
    /// Fields to remove; every value is `1`
    #[serde(rename = "$unset", default, skip_serializing_if = "Map::is_empty")]
    pub unset: Map<String, Value>,
}

impl UpdateCommand {
    /// Creates an empty command.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the command would not change anything.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    /// Records a field overwrite.
    pub fn set_field(&mut self, field: impl Into<String>, value: Value) {
        self.set.insert(field.into(), value);
    }

    /// Records a field removal.
    pub fn unset_field(&mut self, field: impl Into<String>) {
        self.unset.insert(field.into(), Value::from(1));
    }

    /// Applies the command to a document in place.
    pub fn apply(&self, document: &mut Document) {
        for (field, value) in &self.set {
            document.insert(field.clone(), value.clone());
        }
        for field in self.unset.keys() {
            document.remove(field);
        }
    }

    /// Returns the command in its wire form.
    pub fn to_value(&self) -> Value {
        let mut command = Map::new();
        if !self.set.is_empty() {
            command.insert("$set".to_string(), Value::Object(self.set.clone()));
        }
        if !self.unset.is_empty() {
            command.insert("$unset".to_string(), Value::Object(self.unset.clone()));
        }
        Value::Object(command)
    }
}

/// Sort direction of an indexed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum IndexOrder {
    #[default]
    Ascending,
    Descending,
}

impl IndexOrder {
    fn as_i32(self) -> i32 {
        match self {
            IndexOrder::Ascending => 1,
            IndexOrder::Descending => -1,
        }
    }
}

/// Index declaration: a grouping of fields plus options.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Indexed fields in priority order
    pub keys: Vec<(String, IndexOrder)>,
    /// Reject duplicate values
    #[serde(default)]
    pub unique: bool,
    /// Skip documents missing the indexed fields
    #[serde(default)]
    pub sparse: bool,
}

impl IndexSpec {
    /// Ascending index on a single field.
    pub fn field(field: impl Into<String>) -> Self {
        Self {
            keys: vec![(field.into(), IndexOrder::Ascending)],
            unique: false,
            sparse: false,
        }
    }

    /// Compound index on several fields.
    pub fn compound<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = (S, IndexOrder)>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(|(f, o)| (f.into(), o)).collect(),
            unique: false,
            sparse: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }

    /// Conventional index name, e.g. `name_1_created_-1`.
    pub fn name(&self) -> String {
        self.keys
            .iter()
            .map(|(field, order)| format!("{field}_{}", order.as_i32()))
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Store trait abstracting the document database.
///
/// Implementations must be `Send` and `Sync` so a single handle can be shared
/// process-wide, and implement `Any` to allow downcasting in tests.
pub trait Store: Send + Sync + Any {
    /// Checks liveness and (re)connects if necessary. Idempotent.
    fn ensure_connected(&self) -> Result<()>;

    /// Inserts a full document, generating an identity when `_id` is absent.
    ///
    /// # Returns
    /// The identity of the stored document.
    fn insert(&self, collection: &str, document: Document) -> Result<Value>;

    /// Applies a partial update to the documents matching `filter`.
    fn update(&self, collection: &str, filter: &Filter, command: &UpdateCommand) -> Result<()>;

    /// Fetches the document a reference points at, if it exists.
    fn fetch_by_reference(&self, reference: &DbRef) -> Result<Option<Document>>;

    /// Removes every document matching `filter`.
    fn remove(&self, collection: &str, filter: &Filter) -> Result<()>;

    /// Returns every document matching `filter`, in insertion order.
    fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>>;

    /// Returns the first document matching `filter`.
    fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>> {
        Ok(self.find(collection, filter)?.into_iter().next())
    }

    /// Creates an index if it does not exist yet.
    fn ensure_index(&self, collection: &str, index: &IndexSpec) -> Result<()>;
}
