//! Registry mapping collections to document classes.
//!
//! A [`DocumentClass`] adds behaviour to every entity bound to a collection:
//! event listeners, declared indexes and virtual properties. Classes are
//! identified by a type name which is stamped into every inserted document
//! (`_type`), so a loaded document is reconstructed with the class it was
//! written with even when it is read through another collection.

use std::{collections::HashMap, fmt, sync::Arc};

use serde_json::{Map, Value};

use crate::{
    Result,
    constants::TYPE_FIELD,
    events::EventBus,
    properties::EntityProperties,
    store::{IndexSpec, Store},
};

/// Behaviour attached to the entities of a collection.
///
/// # Example
///
/// ```
/// use docmap::{DocumentClass, Registry};
/// use docmap::store::IndexSpec;
/// use std::sync::Arc;
///
/// #[derive(Debug)]
/// struct User;
///
/// impl DocumentClass for User {
///     fn type_name(&self) -> &str {
///         "user:v1"
///     }
///
///     fn supports_type_name(&self, type_name: &str) -> bool {
///         // v1 can read documents written by v0 as well
///         type_name == "user:v0" || type_name == "user:v1"
///     }
///
///     fn indexes(&self) -> Vec<IndexSpec> {
///         vec![IndexSpec::field("email").unique()]
///     }
/// }
///
/// let mut registry = Registry::new();
/// registry.map("users", Arc::new(User));
/// assert!(registry.class_for("users").is_some());
/// assert!(registry.class_named("user:v0").is_some());
/// ```
pub trait DocumentClass: Send + Sync + fmt::Debug {
    /// Discriminator stored in `_type`.
    fn type_name(&self) -> &str;

    /// Check if this class can load documents stamped with `type_name`.
    ///
    /// Override this method to support version migration.
    fn supports_type_name(&self, type_name: &str) -> bool {
        type_name == self.type_name()
    }

    /// Indexes to provision on the mapped collection.
    fn indexes(&self) -> Vec<IndexSpec> {
        Vec::new()
    }

    /// Virtual properties consulted before plain fields.
    fn properties(&self) -> Option<&EntityProperties> {
        None
    }

    /// Attaches listeners to a newly constructed entity of this class.
    fn install(&self, _events: &mut EventBus) {}
}

/// Collection name → document class map.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    by_collection: HashMap<String, Arc<dyn DocumentClass>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `collection` to `class`, replacing any previous binding.
    ///
    /// Embedded documents can be mapped too, by their logical collection
    /// (`posts.author`, `posts.comments.$`).
    pub fn map(&mut self, collection: impl Into<String>, class: Arc<dyn DocumentClass>) {
        let collection = collection.into();
        tracing::debug!(collection, class = class.type_name(), "mapping collection");
        self.by_collection.insert(collection, class);
    }

    /// Class bound to `collection`.
    pub fn class_for(&self, collection: &str) -> Option<Arc<dyn DocumentClass>> {
        self.by_collection.get(collection).cloned()
    }

    /// First class able to load documents stamped with `type_name`.
    pub fn class_named(&self, type_name: &str) -> Option<Arc<dyn DocumentClass>> {
        let mut collections: Vec<&String> = self.by_collection.keys().collect();
        collections.sort();
        collections
            .into_iter()
            .filter_map(|c| self.by_collection.get(c))
            .find(|class| class.supports_type_name(type_name))
            .cloned()
    }

    /// Class to construct `data` with: its `_type` first, then its collection.
    pub fn resolve(
        &self,
        collection: &str,
        data: &Map<String, Value>,
    ) -> Option<Arc<dyn DocumentClass>> {
        data.get(TYPE_FIELD)
            .and_then(Value::as_str)
            .and_then(|type_name| self.class_named(type_name))
            .or_else(|| self.class_for(collection))
    }

    /// Mapped collections, sorted.
    pub fn collections(&self) -> Vec<String> {
        let mut collections: Vec<String> = self.by_collection.keys().cloned().collect();
        collections.sort();
        collections
    }

    /// Creates every declared index on the store.
    ///
    /// Embedded mappings (names containing `.`) are skipped: their documents
    /// live inside another collection.
    ///
    /// # Returns
    /// The number of indexes requested.
    pub fn provision_indexes(&self, store: &dyn Store) -> Result<usize> {
        store.ensure_connected()?;
        let mut requested = 0;
        for collection in self.collections() {
            if collection.contains(crate::constants::PATH_SEPARATOR) {
                continue;
            }
            let Some(class) = self.by_collection.get(&collection) else {
                continue;
            };
            for index in class.indexes() {
                store.ensure_index(&collection, &index)?;
                requested += 1;
            }
        }
        tracing::info!(requested, "provisioned indexes");
        Ok(requested)
    }
}
