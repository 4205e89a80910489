use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::ID_FIELD;
use crate::reference::DbRef;
use crate::store::{
    Document, Filter, IndexSpec, Store, StoreError, UpdateCommand, id_filter, matches,
};
use crate::Result;

/// Collections keyed by name, documents in insertion order.
type Collections = HashMap<String, Vec<Document>>;

/// A write operation received by an [`InMemoryStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    Insert {
        collection: String,
        document: Document,
    },
    Update {
        collection: String,
        filter: Filter,
        command: UpdateCommand,
    },
    Remove {
        collection: String,
        filter: Filter,
    },
}

impl Operation {
    /// Collection the operation was addressed to.
    pub fn collection(&self) -> &str {
        match self {
            Operation::Insert { collection, .. }
            | Operation::Update { collection, .. }
            | Operation::Remove { collection, .. } => collection,
        }
    }
}

/// A simple in-memory store implementation using `HashMap`s for storage.
///
/// This store is suitable for testing, development, or small tools where the
/// data set fits in memory. It can be persisted as JSON, either explicitly via
/// [`save_to_file`](Self::save_to_file) or automatically after every write when
/// opened with [`open_file`](Self::open_file).
///
/// Every write is also appended to an operation journal so callers can inspect
/// exactly which commands the document graph issued.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    /// Documents per collection
    collections: RwLock<Collections>,
    /// Declared indexes per collection
    indexes: RwLock<HashMap<String, Vec<IndexSpec>>>,
    /// Journal of write operations
    journal: RwLock<Vec<Operation>>,
    /// Lazy connection flag
    connected: AtomicBool,
    /// Number of (re)connections performed
    connects: AtomicUsize,
    /// Number of reference lookups served
    fetches: AtomicUsize,
    /// Database name checked against `$db` in references
    database: Option<String>,
    /// File the store is flushed to after every write
    path: Option<PathBuf>,
}

/// Serializable version of InMemoryStore for persistence
#[derive(Serialize, Deserialize)]
struct SerializableStore {
    #[serde(default)]
    database: Option<String>,
    collections: Collections,
    #[serde(default)]
    indexes: HashMap<String, Vec<IndexSpec>>,
}

impl InMemoryStore {
    /// Creates a new, empty `InMemoryStore`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that only resolves references to `database` (or without `$db`).
    pub fn with_database(database: impl Into<String>) -> Self {
        Self {
            database: Some(database.into()),
            ..Self::default()
        }
    }

    /// Name of the database this store represents, if any.
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Opens a file-backed store, loading it if the file exists.
    ///
    /// The returned store writes itself back to `path` after every write.
    pub fn open_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut store = if path.exists() {
            Self::load_from_file(path)?
        } else {
            Self::new()
        };
        store.path = Some(path.to_path_buf());
        Ok(store)
    }

    /// Loads a store previously written by [`save_to_file`](Self::save_to_file).
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents =
            fs::read_to_string(path.as_ref()).map_err(|source| StoreError::FileIo { source })?;
        let stored: SerializableStore =
            serde_json::from_str(&contents).map_err(|source| StoreError::Persistence { source })?;
        tracing::debug!(
            collections = stored.collections.len(),
            "loaded store from {}",
            path.as_ref().display()
        );
        Ok(Self {
            collections: RwLock::new(stored.collections),
            indexes: RwLock::new(stored.indexes),
            database: stored.database,
            ..Self::default()
        })
    }

    /// Writes all collections and indexes to `path` as JSON.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let stored = SerializableStore {
            database: self.database.clone(),
            collections: self.read_collections()?.clone(),
            indexes: self
                .indexes
                .read()
                .map_err(|_| StoreError::LockPoisoned { what: "indexes" })?
                .clone(),
        };
        let json = serde_json::to_string_pretty(&stored)
            .map_err(|source| StoreError::Persistence { source })?;
        fs::write(path.as_ref(), json).map_err(|source| StoreError::FileIo { source })?;
        Ok(())
    }

    /// Returns true after the first successful `ensure_connected`.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Drops the (simulated) connection; the next operation reconnects.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Number of times the store had to (re)connect.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of reference lookups served.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Snapshot of the write journal.
    pub fn operations(&self) -> Vec<Operation> {
        self.journal
            .read()
            .map(|journal| journal.clone())
            .unwrap_or_default()
    }

    /// Clears the write journal.
    pub fn clear_operations(&self) {
        if let Ok(mut journal) = self.journal.write() {
            journal.clear();
        }
    }

    /// Number of documents in `collection`.
    pub fn count(&self, collection: &str) -> Result<usize> {
        Ok(self
            .read_collections()?
            .get(collection)
            .map_or(0, |documents| documents.len()))
    }

    /// Indexes declared on `collection`.
    pub fn indexes(&self, collection: &str) -> Vec<IndexSpec> {
        self.indexes
            .read()
            .ok()
            .and_then(|indexes| indexes.get(collection).cloned())
            .unwrap_or_default()
    }

    fn read_collections(&self) -> Result<RwLockReadGuard<'_, Collections>> {
        Ok(self
            .collections
            .read()
            .map_err(|_| StoreError::LockPoisoned {
                what: "collections",
            })?)
    }

    fn write_collections(&self) -> Result<RwLockWriteGuard<'_, Collections>> {
        Ok(self
            .collections
            .write()
            .map_err(|_| StoreError::LockPoisoned {
                what: "collections",
            })?)
    }

    fn record(&self, operation: Operation) -> Result<()> {
        self.journal
            .write()
            .map_err(|_| StoreError::LockPoisoned { what: "journal" })?
            .push(operation);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        match &self.path {
            Some(path) => self.save_to_file(path),
            None => Ok(()),
        }
    }
}

impl Store for InMemoryStore {
    fn ensure_connected(&self) -> Result<()> {
        if !self.connected.swap(true, Ordering::SeqCst) {
            let count = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::debug!(count, "in-memory store connected");
        }
        Ok(())
    }

    fn insert(&self, collection: &str, mut document: Document) -> Result<Value> {
        let id = document
            .entry(ID_FIELD)
            .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()))
            .clone();

        {
            let mut collections = self.write_collections()?;
            let documents = collections.entry(collection.to_string()).or_default();
            if documents.iter().any(|d| d.get(ID_FIELD) == Some(&id)) {
                return Err(StoreError::DuplicateKey {
                    collection: collection.to_string(),
                    id: id.to_string(),
                }
                .into());
            }
            documents.push(document.clone());
        }

        self.record(Operation::Insert {
            collection: collection.to_string(),
            document,
        })?;
        self.flush()?;
        Ok(id)
    }

    fn update(&self, collection: &str, filter: &Filter, command: &UpdateCommand) -> Result<()> {
        {
            let mut collections = self.write_collections()?;
            if let Some(documents) = collections.get_mut(collection) {
                for document in documents.iter_mut().filter(|d| matches(d, filter)) {
                    command.apply(document);
                }
            }
        }

        self.record(Operation::Update {
            collection: collection.to_string(),
            filter: filter.clone(),
            command: command.clone(),
        })?;
        self.flush()
    }

    fn fetch_by_reference(&self, reference: &DbRef) -> Result<Option<Document>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let (Some(wanted), Some(ours)) = (&reference.database, &self.database) {
            if wanted != ours {
                return Ok(None);
            }
        }
        self.find_one(&reference.collection, &id_filter(&reference.id))
    }

    fn remove(&self, collection: &str, filter: &Filter) -> Result<()> {
        {
            let mut collections = self.write_collections()?;
            if let Some(documents) = collections.get_mut(collection) {
                documents.retain(|d| !matches(d, filter));
            }
        }

        self.record(Operation::Remove {
            collection: collection.to_string(),
            filter: filter.clone(),
        })?;
        self.flush()
    }

    fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>> {
        Ok(self
            .read_collections()?
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|d| matches(d, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn ensure_index(&self, collection: &str, index: &IndexSpec) -> Result<()> {
        {
            let mut indexes = self
                .indexes
                .write()
                .map_err(|_| StoreError::LockPoisoned { what: "indexes" })?;
            let declared = indexes.entry(collection.to_string()).or_default();
            if !declared.contains(index) {
                tracing::debug!(collection, index = %index.name(), "creating index");
                declared.push(index.clone());
            }
        }
        self.flush()
    }
}
