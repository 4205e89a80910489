use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use docmap::{
    DbRef, EntityId, InMemoryStore, Registry, Result, Session, SetId, Store,
    store::{Document, Filter, IndexSpec, StoreError, UpdateCommand, in_memory::Operation},
};
use serde_json::Value;

/// A session over a fresh in-memory store, with the store kept at hand for
/// inspecting the operations the session issued.
pub struct TestContext {
    store: Arc<InMemoryStore>,
    session: Session,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_registry(Registry::new())
    }

    pub fn with_registry(registry: Registry) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let session = Session::with_registry(store.clone(), Arc::new(registry));
        Self { store, session }
    }

    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }

    pub fn session(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Loads `data` as a persisted document of `collection`.
    pub fn load(&mut self, collection: &str, data: Value) -> EntityId {
        self.session
            .load(collection, data)
            .expect("Failed to load document")
    }

    /// Inserts `data` into the store and loads it back.
    pub fn stored(&mut self, collection: &str, data: Value) -> EntityId {
        let entity = self
            .session
            .create(collection)
            .expect("Failed to create document");
        let Value::Object(fields) = data else {
            panic!("stored documents must be objects");
        };
        for (field, value) in fields {
            self.session
                .set(entity, &field, value)
                .expect("Failed to set field");
        }
        self.session.save(entity).expect("Failed to insert document");
        self.store.clear_operations();
        entity
    }

    /// Write operations issued since the last call.
    pub fn take_operations(&self) -> Vec<Operation> {
        let operations = self.store.operations();
        self.store.clear_operations();
        operations
    }
}

/// Entity held in `field`, panicking otherwise.
pub fn entity_field(session: &mut Session, entity: EntityId, field: &str) -> EntityId {
    session
        .get(entity, field)
        .expect("Failed to read field")
        .and_then(|slot| slot.as_entity())
        .unwrap_or_else(|| panic!("field '{field}' does not hold an entity"))
}

/// Set held in `field`, panicking otherwise.
pub fn set_field(session: &mut Session, entity: EntityId, field: &str) -> SetId {
    session
        .get(entity, field)
        .expect("Failed to read field")
        .and_then(|slot| slot.as_set())
        .unwrap_or_else(|| panic!("field '{field}' does not hold a set"))
}

pub fn assert_field(session: &mut Session, entity: EntityId, field: &str, expected: Value) {
    let actual = session
        .get_json(entity, field)
        .expect("Failed to read field");
    assert_eq!(actual, Some(expected), "unexpected value for '{field}'");
}

/// The single update in `operations`, panicking on anything else.
pub fn single_update(operations: &[Operation]) -> &UpdateCommand {
    match operations {
        [Operation::Update { command, .. }] => command,
        other => panic!("expected exactly one update, got {other:?}"),
    }
}

/// In-memory store whose updates can be switched to fail.
pub struct RefusingUpdates {
    inner: InMemoryStore,
    refuse: AtomicBool,
}

impl RefusingUpdates {
    pub fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            refuse: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    pub fn refuse_updates(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

impl Store for RefusingUpdates {
    fn ensure_connected(&self) -> Result<()> {
        self.inner.ensure_connected()
    }

    fn insert(&self, collection: &str, document: Document) -> Result<Value> {
        self.inner.insert(collection, document)
    }

    fn update(&self, collection: &str, filter: &Filter, command: &UpdateCommand) -> Result<()> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(StoreError::FileIo {
                source: std::io::Error::other("update refused"),
            }
            .into());
        }
        self.inner.update(collection, filter, command)
    }

    fn fetch_by_reference(&self, reference: &DbRef) -> Result<Option<Document>> {
        self.inner.fetch_by_reference(reference)
    }

    fn remove(&self, collection: &str, filter: &Filter) -> Result<()> {
        self.inner.remove(collection, filter)
    }

    fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>> {
        self.inner.find(collection, filter)
    }

    fn ensure_index(&self, collection: &str, index: &IndexSpec) -> Result<()> {
        self.inner.ensure_index(collection, index)
    }
}
