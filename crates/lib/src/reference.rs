//! Reference tokens pointing at other stored documents.
//!
//! A reference is stored inline as `{"$ref": <collection>, "$id": <key>}`, optionally
//! with a `"$db"` name. Only values with exactly this shape are references; a
//! regular nested object that happens to carry a `$ref` key next to other fields is
//! plain data.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::{REF_COLLECTION, REF_DATABASE, REF_ID};

/// An unresolved link to a document in another (or the same) collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbRef {
    /// Target collection
    #[serde(rename = "$ref")]
    pub collection: String,
    /// Target identity
    #[serde(rename = "$id")]
    pub id: Value,
    /// Target database, when it differs from the store's own
    #[serde(rename = "$db", default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

impl DbRef {
    /// Creates a reference to `id` in `collection`.
    pub fn new(collection: impl Into<String>, id: impl Into<Value>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
            database: None,
        }
    }

    /// Sets the target database.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Parses a raw value, returning `None` unless it has the reference shape.
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let collection = map.get(REF_COLLECTION)?.as_str()?;
        let id = map.get(REF_ID)?;
        if id.is_null() {
            return None;
        }

        let database = match map.get(REF_DATABASE) {
            Some(Value::String(db)) => Some(db.clone()),
            Some(_) => return None,
            None => None,
        };

        let expected_len = if database.is_some() { 3 } else { 2 };
        if map.len() != expected_len {
            return None;
        }

        Some(Self {
            collection: collection.to_string(),
            id: id.clone(),
            database,
        })
    }

    /// Returns the token in its stored form.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(
            REF_COLLECTION.to_string(),
            Value::String(self.collection.clone()),
        );
        map.insert(REF_ID.to_string(), self.id.clone());
        if let Some(database) = &self.database {
            map.insert(REF_DATABASE.to_string(), Value::String(database.clone()));
        }
        Value::Object(map)
    }
}

/// Returns true if `value` has the reference token shape.
pub fn is_reference(value: &Value) -> bool {
    DbRef::from_value(value).is_some()
}

impl From<DbRef> for Value {
    fn from(reference: DbRef) -> Self {
        reference.to_value()
    }
}

impl fmt::Display for DbRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.database {
            Some(db) => write!(f, "{db}.{}[{}]", self.collection, self.id),
            None => write!(f, "{}[{}]", self.collection, self.id),
        }
    }
}
