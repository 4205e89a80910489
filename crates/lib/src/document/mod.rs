//! The in-memory document graph.
//!
//! A [`Session`] owns every node of the graphs it materializes. Entities and
//! sets are stored in a slot arena and addressed through copyable handles
//! ([`EntityId`], [`SetId`]); each node keeps a back-link to its owner so that
//! saves of embedded nodes can be delegated to the top-level document.
//!
//! Entities keep two views of their fields:
//!
//! - a **baseline**, the last state known to be persisted, and
//! - **pending** assignments and removals made since.
//!
//! The effective data of an entity is the baseline overlaid with pending
//! assignments, minus pending removals. The save algorithm in `save.rs`
//! compiles the difference into a partial update.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
};

use serde_json::Value;
use slotmap::SlotMap;

use crate::{
    Result,
    constants::DEFAULT_TYPE,
    events::EventBus,
    reference::DbRef,
    registry::{DocumentClass, Registry},
    store::Store,
};

mod classify;
mod entity;
pub mod errors;
mod resolve;
mod save;
mod set;


pub use errors::DocumentError;

slotmap::new_key_type! {
    /// Arena key of a node.
    pub(crate) struct NodeId;
}

/// Handle to an entity owned by a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId(pub(crate) NodeId);

/// Handle to an ordered set owned by a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SetId(pub(crate) NodeId);

/// Handle to any node of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Entity(EntityId),
    Set(SetId),
}

impl NodeRef {
    pub(crate) fn key(self) -> NodeId {
        match self {
            NodeRef::Entity(EntityId(key)) | NodeRef::Set(SetId(key)) => key,
        }
    }

    pub fn as_entity(self) -> Option<EntityId> {
        match self {
            NodeRef::Entity(id) => Some(id),
            NodeRef::Set(_) => None,
        }
    }

    pub fn as_set(self) -> Option<SetId> {
        match self {
            NodeRef::Set(id) => Some(id),
            NodeRef::Entity(_) => None,
        }
    }
}

impl From<EntityId> for NodeRef {
    fn from(id: EntityId) -> Self {
        NodeRef::Entity(id)
    }
}

impl From<SetId> for NodeRef {
    fn from(id: SetId) -> Self {
        NodeRef::Set(id)
    }
}

/// A field or element value as held by the graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// Plain JSON value (never an object or array)
    Scalar(Value),
    /// Embedded or resolved document
    Entity(EntityId),
    /// Ordered collection
    Set(SetId),
    /// Reference token not resolved yet
    Reference(DbRef),
}

impl Slot {
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Slot::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<EntityId> {
        match self {
            Slot::Entity(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<SetId> {
        match self {
            Slot::Set(id) => Some(*id),
            _ => None,
        }
    }

    /// Node held by this slot, if any.
    pub fn node(&self) -> Option<NodeRef> {
        match self {
            Slot::Entity(id) => Some(NodeRef::Entity(*id)),
            Slot::Set(id) => Some(NodeRef::Set(*id)),
            Slot::Scalar(_) | Slot::Reference(_) => None,
        }
    }
}

impl From<NodeRef> for Slot {
    fn from(node: NodeRef) -> Self {
        match node {
            NodeRef::Entity(id) => Slot::Entity(id),
            NodeRef::Set(id) => Slot::Set(id),
        }
    }
}

/// Value accepted by field and element assignment.
///
/// Raw JSON is classified into scalars, entities, sets or reference tokens.
/// Existing nodes are adopted when they have no owner yet and copied otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum Assign {
    Raw(Value),
    Entity(EntityId),
    Set(SetId),
}

impl From<Value> for Assign {
    fn from(value: Value) -> Self {
        Assign::Raw(value)
    }
}

impl From<EntityId> for Assign {
    fn from(id: EntityId) -> Self {
        Assign::Entity(id)
    }
}

impl From<SetId> for Assign {
    fn from(id: SetId) -> Self {
        Assign::Set(id)
    }
}

impl From<DbRef> for Assign {
    fn from(reference: DbRef) -> Self {
        Assign::Raw(reference.to_value())
    }
}

impl From<&str> for Assign {
    fn from(value: &str) -> Self {
        Assign::Raw(Value::String(value.to_string()))
    }
}

impl From<String> for Assign {
    fn from(value: String) -> Self {
        Assign::Raw(Value::String(value))
    }
}

impl From<i64> for Assign {
    fn from(value: i64) -> Self {
        Assign::Raw(Value::from(value))
    }
}

impl From<i32> for Assign {
    fn from(value: i32) -> Self {
        Assign::Raw(Value::from(value))
    }
}

impl From<f64> for Assign {
    fn from(value: f64) -> Self {
        Assign::Raw(Value::from(value))
    }
}

impl From<bool> for Assign {
    fn from(value: bool) -> Self {
        Assign::Raw(Value::Bool(value))
    }
}

pub(crate) struct EntityNode {
    /// Collection for top-level documents, logical collection for embedded ones
    pub(crate) collection: String,
    /// Path relative to the owning document, empty at the top
    pub(crate) path: String,
    pub(crate) baseline: BTreeMap<String, Slot>,
    pub(crate) pending_set: BTreeMap<String, Slot>,
    pub(crate) pending_unset: BTreeSet<String>,
    pub(crate) parent: Option<NodeRef>,
    /// Set when this entity stands in for another stored document
    pub(crate) reference: Option<DbRef>,
    pub(crate) class: Option<Arc<dyn DocumentClass>>,
    pub(crate) events: EventBus,
}

impl EntityNode {
    pub(crate) fn new(
        collection: String,
        path: String,
        parent: Option<NodeRef>,
        class: Option<Arc<dyn DocumentClass>>,
    ) -> Self {
        let mut events = EventBus::new();
        if let Some(class) = &class {
            class.install(&mut events);
        }
        Self {
            collection,
            path,
            baseline: BTreeMap::new(),
            pending_set: BTreeMap::new(),
            pending_unset: BTreeSet::new(),
            parent,
            reference: None,
            class,
            events,
        }
    }

    /// Effective value of `field`.
    pub(crate) fn lookup(&self, field: &str) -> Option<&Slot> {
        if let Some(slot) = self.pending_set.get(field) {
            return Some(slot);
        }
        if self.pending_unset.contains(field) {
            return None;
        }
        self.baseline.get(field)
    }

    /// Baseline overlaid with pending assignments, minus pending removals.
    pub(crate) fn effective(&self) -> BTreeMap<String, Slot> {
        let mut fields: BTreeMap<String, Slot> = self
            .baseline
            .iter()
            .filter(|(field, _)| !self.pending_unset.contains(*field))
            .map(|(field, slot)| (field.clone(), slot.clone()))
            .collect();
        for (field, slot) in &self.pending_set {
            fields.insert(field.clone(), slot.clone());
        }
        fields
    }

    pub(crate) fn is_modified(&self) -> bool {
        !self.pending_set.is_empty() || !self.pending_unset.is_empty()
    }

    /// Persisted identity, read from the baseline only.
    pub(crate) fn id(&self) -> Option<&Value> {
        match self.baseline.get(crate::constants::ID_FIELD) {
            Some(Slot::Scalar(Value::Null)) | None => None,
            Some(Slot::Scalar(id)) => Some(id),
            Some(_) => None,
        }
    }

    pub(crate) fn type_name(&self) -> &str {
        self.class
            .as_ref()
            .map_or(DEFAULT_TYPE, |class| class.type_name())
    }

    pub(crate) fn children(&self) -> Vec<NodeRef> {
        self.baseline
            .values()
            .chain(self.pending_set.values())
            .filter_map(Slot::node)
            .collect()
    }
}

pub(crate) struct SetNode {
    /// Path relative to the owning document
    pub(crate) path: String,
    pub(crate) elements: Vec<Slot>,
    pub(crate) modified: bool,
    pub(crate) parent: Option<NodeRef>,
}

impl SetNode {
    pub(crate) fn new(path: String, parent: Option<NodeRef>) -> Self {
        Self {
            path,
            elements: Vec::new(),
            modified: false,
            parent,
        }
    }
}

pub(crate) enum Node {
    Entity(EntityNode),
    Set(SetNode),
}

impl Node {
    fn parent(&self) -> Option<NodeRef> {
        match self {
            Node::Entity(entity) => entity.parent,
            Node::Set(set) => set.parent,
        }
    }

    fn parent_mut(&mut self) -> &mut Option<NodeRef> {
        match self {
            Node::Entity(entity) => &mut entity.parent,
            Node::Set(set) => &mut set.parent,
        }
    }
}

/// Owner of materialized document graphs and the store they persist to.
///
/// All entity and set operations go through the session, which hands out
/// handles instead of references so that graphs with back-links stay within
/// the borrow rules.
pub struct Session {
    nodes: SlotMap<NodeId, Node>,
    store: Arc<dyn Store>,
    registry: Arc<Registry>,
}

impl Session {
    /// Creates a session over `store` with no document classes.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_registry(store, Arc::new(Registry::new()))
    }

    pub fn with_registry(store: Arc<dyn Store>, registry: Arc<Registry>) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            store,
            registry,
        }
    }

    /// Creates a session over the process-wide default store.
    ///
    /// Fails with [`StoreError::MissingConnection`](crate::store::StoreError::MissingConnection)
    /// when no default store was initialized.
    pub fn from_default() -> Result<Self> {
        Ok(Self::new(crate::connection::default_store()?))
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Number of live nodes held by the session.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn entity_node(&self, id: EntityId) -> Result<&EntityNode> {
        match self.nodes.get(id.0) {
            Some(Node::Entity(entity)) => Ok(entity),
            _ => Err(DocumentError::NodeNotFound { kind: "entity" }.into()),
        }
    }

    pub(crate) fn entity_node_mut(&mut self, id: EntityId) -> Result<&mut EntityNode> {
        match self.nodes.get_mut(id.0) {
            Some(Node::Entity(entity)) => Ok(entity),
            _ => Err(DocumentError::NodeNotFound { kind: "entity" }.into()),
        }
    }

    pub(crate) fn set_node(&self, id: SetId) -> Result<&SetNode> {
        match self.nodes.get(id.0) {
            Some(Node::Set(set)) => Ok(set),
            _ => Err(DocumentError::NodeNotFound { kind: "set" }.into()),
        }
    }

    pub(crate) fn set_node_mut(&mut self, id: SetId) -> Result<&mut SetNode> {
        match self.nodes.get_mut(id.0) {
            Some(Node::Set(set)) => Ok(set),
            _ => Err(DocumentError::NodeNotFound { kind: "set" }.into()),
        }
    }

    pub(crate) fn entity_events(&self, id: EntityId) -> Result<&EventBus> {
        Ok(&self.entity_node(id)?.events)
    }

    pub(crate) fn insert_node(&mut self, node: Node) -> NodeId {
        self.nodes.insert(node)
    }

    /// Listeners of `entity`, for registering hooks.
    pub fn events_mut(&mut self, entity: EntityId) -> Result<&mut EventBus> {
        Ok(&mut self.entity_node_mut(entity)?.events)
    }

    /// Owner of `node`, if any.
    pub fn parent(&self, node: impl Into<NodeRef>) -> Result<Option<NodeRef>> {
        let node = node.into();
        self.nodes
            .get(node.key())
            .map(Node::parent)
            .ok_or_else(|| not_found(node).into())
    }

    /// Rewires the owner link of `node`.
    ///
    /// This only changes the back-link used for save delegation and event
    /// routing; it does not move the node into a field of `parent`.
    pub fn set_parent(&mut self, node: impl Into<NodeRef>, parent: Option<NodeRef>) -> Result<()> {
        let node = node.into();
        if !self.nodes.contains_key(node.key()) {
            return Err(not_found(node).into());
        }
        if let Some(parent) = parent {
            let mut current = Some(parent);
            while let Some(ancestor) = current {
                if ancestor == node {
                    return Err(DocumentError::InvalidParent {
                        reason: "a node cannot own one of its ancestors".to_string(),
                    }
                    .into());
                }
                current = match self.nodes.get(ancestor.key()) {
                    Some(found) => found.parent(),
                    None => {
                        return Err(DocumentError::InvalidParent {
                            reason: "the parent is not a live node".to_string(),
                        }
                        .into());
                    }
                };
            }
        }
        if let Some(found) = self.nodes.get_mut(node.key()) {
            *found.parent_mut() = parent;
        }
        Ok(())
    }

    /// Terminal ancestor of `node` (the node itself when it has no owner).
    pub fn root(&self, node: impl Into<NodeRef>) -> Result<NodeRef> {
        let mut current = node.into();
        while let Some(parent) = self.parent(current)? {
            current = parent;
        }
        Ok(current)
    }

    /// Nearest entity owning `node`, skipping sets.
    pub fn parent_entity(&self, node: impl Into<NodeRef>) -> Result<Option<EntityId>> {
        let mut current = self.parent(node)?;
        while let Some(parent) = current {
            match parent {
                NodeRef::Entity(id) => return Ok(Some(id)),
                NodeRef::Set(id) => current = self.set_node(id)?.parent,
            }
        }
        Ok(None)
    }

    /// Path of `node` relative to the document that owns it.
    pub fn path(&self, node: impl Into<NodeRef>) -> Result<&str> {
        match node.into() {
            NodeRef::Entity(id) => Ok(&self.entity_node(id)?.path),
            NodeRef::Set(id) => Ok(&self.set_node(id)?.path),
        }
    }

    /// Check if `node` carries unsaved changes of its own.
    ///
    /// For entities this is shallow: only assignments and removals on the
    /// entity itself count. A set also counts as modified when anything
    /// beneath it changed, since the whole set is rewritten.
    pub fn is_modified(&self, node: impl Into<NodeRef>) -> Result<bool> {
        match node.into() {
            NodeRef::Entity(id) => Ok(self.entity_node(id)?.is_modified()),
            NodeRef::Set(id) => self.is_dirty(NodeRef::Set(id)),
        }
    }

    /// Check if `entity` or anything embedded in it changed.
    ///
    /// Resolved references are separate documents and are not included.
    pub fn has_changes(&self, entity: EntityId) -> Result<bool> {
        self.is_dirty(NodeRef::Entity(entity))
    }

    pub(crate) fn is_dirty(&self, node: NodeRef) -> Result<bool> {
        let children = match node {
            NodeRef::Entity(id) => {
                let entity = self.entity_node(id)?;
                if entity.is_modified() {
                    return Ok(true);
                }
                entity
                    .effective()
                    .values()
                    .filter_map(Slot::node)
                    .collect::<Vec<_>>()
            }
            NodeRef::Set(id) => {
                let set = self.set_node(id)?;
                if set.modified {
                    return Ok(true);
                }
                set.elements.iter().filter_map(Slot::node).collect()
            }
        };
        for child in children {
            if let NodeRef::Entity(id) = child {
                if self.entity_node(id)?.reference.is_some() {
                    continue;
                }
            }
            if self.is_dirty(child)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Entity that owns the document `node` belongs to.
    ///
    /// Walks up until a top-level entity or a resolved reference is found.
    /// Field events and logical collection names are anchored there.
    pub(crate) fn document_root(&self, node: NodeRef) -> Result<Option<EntityId>> {
        let mut current = Some(node);
        let mut topmost = None;
        while let Some(step) = current {
            current = match step {
                NodeRef::Entity(id) => {
                    let entity = self.entity_node(id)?;
                    topmost = Some(id);
                    if entity.parent.is_none() || entity.reference.is_some() {
                        return Ok(Some(id));
                    }
                    entity.parent
                }
                NodeRef::Set(id) => self.set_node(id)?.parent,
            };
        }
        Ok(topmost)
    }

    /// Frees `node` and everything beneath it.
    pub(crate) fn release(&mut self, node: NodeRef) {
        let mut stack = vec![node.key()];
        while let Some(key) = stack.pop() {
            match self.nodes.remove(key) {
                Some(Node::Entity(entity)) => {
                    stack.extend(entity.children().into_iter().map(NodeRef::key));
                }
                Some(Node::Set(set)) => {
                    stack.extend(set.elements.iter().filter_map(Slot::node).map(NodeRef::key));
                }
                None => {}
            }
        }
    }

    /// Drops a top-level document graph from the session.
    ///
    /// Embedded nodes are owned by their document and cannot be discarded
    /// on their own; unset the field instead.
    pub fn discard(&mut self, node: impl Into<NodeRef>) -> Result<()> {
        let node = node.into();
        if self.parent(node)?.is_some() {
            return Err(DocumentError::InvalidParent {
                reason: "only nodes without an owner can be discarded".to_string(),
            }
            .into());
        }
        self.release(node);
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("nodes", &self.nodes.len())
            .field("registry", &self.registry)
            .finish()
    }
}

fn not_found(node: NodeRef) -> DocumentError {
    DocumentError::NodeNotFound {
        kind: match node {
            NodeRef::Entity(_) => "entity",
            NodeRef::Set(_) => "set",
        },
    }
}

/// Rejects field names containing the path separator.
pub(crate) fn validate_field_name(field: &str) -> Result<()> {
    if field.contains(crate::constants::PATH_SEPARATOR) {
        return Err(DocumentError::InvalidFieldName {
            field: field.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Name of the JSON type of `value`, for error messages.
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
