//! Turning raw JSON into graph nodes.

use serde_json::{Map, Value};

use super::{
    EntityId, EntityNode, Node, NodeRef, SetId, SetNode, Slot, validate_field_name,
};
use crate::{
    Result, Session,
    constants::{element_path, join_path},
    reference::DbRef,
};

/// Check if `map` has a key that is not an array position.
fn has_named_key(map: &Map<String, Value>) -> bool {
    map.keys().any(|key| key.parse::<usize>().is_err())
}

/// Values of a positional map, ordered by position.
fn positional_values(map: Map<String, Value>) -> Vec<Value> {
    let mut entries: Vec<(usize, Value)> = map
        .into_iter()
        .filter_map(|(key, value)| key.parse::<usize>().ok().map(|index| (index, value)))
        .collect();
    entries.sort_by_key(|(index, _)| *index);
    entries.into_iter().map(|(_, value)| value).collect()
}

impl Session {
    /// Classifies a raw value into the slot that represents it at `path`.
    ///
    /// - a reference token stays a [`Slot::Reference`] until first read;
    /// - an object with at least one named key becomes an entity;
    /// - an array, or an object whose keys are all positions, becomes a set;
    /// - anything else is a scalar.
    ///
    /// New nodes get `owner` as their parent but are not placed in any field.
    /// With `is_baseline` the data is treated as already persisted, so field
    /// names are not validated and no change is recorded.
    pub fn classify(
        &mut self,
        raw: Value,
        path: &str,
        owner: Option<NodeRef>,
        is_baseline: bool,
    ) -> Result<Slot> {
        if let Some(reference) = DbRef::from_value(&raw) {
            return Ok(Slot::Reference(reference));
        }
        match raw {
            Value::Object(map) if has_named_key(&map) => {
                let collection = self.logical_collection(owner, path)?;
                let class = self.registry.resolve(&collection, &map);
                let node = EntityNode::new(collection, path.to_string(), owner, class);
                Ok(Slot::Entity(self.insert_entity(node, map, is_baseline)?))
            }
            Value::Object(map) => {
                let items = positional_values(map);
                Ok(Slot::Set(self.insert_set(path, items, owner, is_baseline)?))
            }
            Value::Array(items) => Ok(Slot::Set(self.insert_set(path, items, owner, is_baseline)?)),
            scalar => Ok(Slot::Scalar(scalar)),
        }
    }

    /// Adds `node` to the arena and fills it from `data`.
    ///
    /// Baseline data lands in the baseline; anything else is recorded as
    /// pending assignments. Nothing is left in the arena on failure.
    pub(crate) fn insert_entity(
        &mut self,
        node: EntityNode,
        data: Map<String, Value>,
        is_baseline: bool,
    ) -> Result<EntityId> {
        let id = EntityId(self.insert_node(Node::Entity(node)));
        if let Err(err) = self.fill_entity(id, data, is_baseline) {
            self.release(NodeRef::Entity(id));
            return Err(err);
        }
        Ok(id)
    }

    fn fill_entity(&mut self, id: EntityId, data: Map<String, Value>, is_baseline: bool) -> Result<()> {
        let path = self.entity_node(id)?.path.clone();
        for (field, value) in data {
            if !is_baseline {
                validate_field_name(&field)?;
            }
            let slot = self.classify(value, &join_path(&path, &field), Some(id.into()), is_baseline)?;
            let entity = self.entity_node_mut(id)?;
            if is_baseline {
                entity.baseline.insert(field, slot);
            } else {
                entity.pending_set.insert(field, slot);
            }
        }
        Ok(())
    }

    /// Adds a set holding `items` to the arena.
    ///
    /// A set built from non-baseline data starts out modified.
    pub(crate) fn insert_set(
        &mut self,
        path: &str,
        items: Vec<Value>,
        owner: Option<NodeRef>,
        is_baseline: bool,
    ) -> Result<SetId> {
        let mut node = SetNode::new(path.to_string(), owner);
        node.modified = !is_baseline;
        let id = SetId(self.insert_node(Node::Set(node)));
        let element_path = element_path(path);
        for item in items {
            let slot = match self.classify(item, &element_path, Some(id.into()), is_baseline) {
                Ok(slot) => slot,
                Err(err) => {
                    self.release(NodeRef::Set(id));
                    return Err(err);
                }
            };
            self.set_node_mut(id)?.elements.push(slot);
        }
        Ok(id)
    }

    /// Collection name for documents embedded at `path` below `owner`.
    ///
    /// Embedded documents are named after the collection of their owning
    /// document followed by their path, e.g. `posts.comments.$`.
    pub(crate) fn logical_collection(&self, owner: Option<NodeRef>, path: &str) -> Result<String> {
        let Some(owner) = owner else {
            return Ok(path.to_string());
        };
        match self.document_root(owner)? {
            Some(root) => Ok(join_path(&self.entity_node(root)?.collection, path)),
            None => Ok(path.to_string()),
        }
    }

    /// Rewrites paths and logical collections below `node` after it moved.
    ///
    /// Resolved references keep their own naming.
    pub(crate) fn rebase(&mut self, node: NodeRef, path: &str) -> Result<()> {
        match node {
            NodeRef::Entity(id) => {
                if self.entity_node(id)?.reference.is_some() {
                    return Ok(());
                }
                let parent = self.entity_node(id)?.parent;
                let collection = self.logical_collection(parent, path)?;
                let entity = self.entity_node_mut(id)?;
                entity.path = path.to_string();
                entity.collection = collection;
                let children: Vec<(String, NodeRef)> = entity
                    .baseline
                    .iter()
                    .chain(entity.pending_set.iter())
                    .filter_map(|(field, slot)| slot.node().map(|child| (field.clone(), child)))
                    .collect();
                for (field, child) in children {
                    self.rebase(child, &join_path(path, &field))?;
                }
            }
            NodeRef::Set(id) => {
                let set = self.set_node_mut(id)?;
                set.path = path.to_string();
                let children: Vec<NodeRef> = set.elements.iter().filter_map(Slot::node).collect();
                let element_path = element_path(path);
                for child in children {
                    self.rebase(child, &element_path)?;
                }
            }
        }
        Ok(())
    }

    /// Deep copy of `node`, without an owner.
    pub(crate) fn duplicate(&mut self, node: NodeRef) -> Result<NodeRef> {
        match node {
            NodeRef::Entity(id) => {
                let source = self.entity_node(id)?;
                let baseline: Vec<(String, Slot)> = source
                    .baseline
                    .iter()
                    .map(|(field, slot)| (field.clone(), slot.clone()))
                    .collect();
                let pending: Vec<(String, Slot)> = source
                    .pending_set
                    .iter()
                    .map(|(field, slot)| (field.clone(), slot.clone()))
                    .collect();
                let mut copy = EntityNode::new(
                    source.collection.clone(),
                    source.path.clone(),
                    None,
                    None,
                );
                copy.class = source.class.clone();
                copy.events = source.events.clone();
                copy.reference = source.reference.clone();
                copy.pending_unset = source.pending_unset.clone();

                let copy_id = EntityId(self.insert_node(Node::Entity(copy)));
                for (field, slot) in baseline {
                    let slot = self.duplicate_slot(slot, copy_id.into())?;
                    self.entity_node_mut(copy_id)?.baseline.insert(field, slot);
                }
                for (field, slot) in pending {
                    let slot = self.duplicate_slot(slot, copy_id.into())?;
                    self.entity_node_mut(copy_id)?.pending_set.insert(field, slot);
                }
                Ok(copy_id.into())
            }
            NodeRef::Set(id) => {
                let source = self.set_node(id)?;
                let elements = source.elements.clone();
                let mut copy = SetNode::new(source.path.clone(), None);
                copy.modified = source.modified;

                let copy_id = SetId(self.insert_node(Node::Set(copy)));
                for slot in elements {
                    let slot = self.duplicate_slot(slot, copy_id.into())?;
                    self.set_node_mut(copy_id)?.elements.push(slot);
                }
                Ok(copy_id.into())
            }
        }
    }

    fn duplicate_slot(&mut self, slot: Slot, owner: NodeRef) -> Result<Slot> {
        let Some(node) = slot.node() else {
            return Ok(slot);
        };
        let copy = self.duplicate(node)?;
        self.set_parent(copy, Some(owner))?;
        Ok(copy.into())
    }

    /// Places `node` under `owner` at `path`.
    ///
    /// Nodes that already have an owner are copied so that no node is ever
    /// held by two fields.
    pub(crate) fn adopt(&mut self, node: NodeRef, owner: NodeRef, path: &str) -> Result<Slot> {
        let (node, copied) = if self.parent(node)?.is_some() {
            (self.duplicate(node)?, true)
        } else {
            (node, false)
        };
        if let Err(err) = self.set_parent(node, Some(owner)) {
            if copied {
                self.release(node);
            }
            return Err(err);
        }
        self.rebase(node, path)?;
        Ok(node.into())
    }
}
