//! Field access on entities.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::{
    Assign, DocumentError, EntityId, EntityNode, NodeRef, SetId, Slot, validate_field_name,
    value_kind,
};
use crate::{
    Result, Session,
    constants::{element_path, join_path},
    events::{self, HookOutcome, SetEvent},
    reference::DbRef,
    store::{Document, Filter, id_filter},
};

impl Session {
    /// Creates an empty top-level document bound to `collection`.
    pub fn create(&mut self, collection: impl Into<String>) -> Result<EntityId> {
        let collection = collection.into();
        let class = self.registry.class_for(&collection);
        let node = EntityNode::new(collection, String::new(), None, class);
        self.insert_entity(node, Map::new(), true)
    }

    /// Materializes a stored document of `collection`.
    ///
    /// The data becomes the baseline: the new entity reports no changes.
    pub fn load(&mut self, collection: impl Into<String>, data: Value) -> Result<EntityId> {
        let collection = collection.into();
        match data {
            Value::Object(map) => self.load_document(collection, map),
            other => Err(DocumentError::InvalidDocumentData {
                collection,
                found: value_kind(&other),
            }
            .into()),
        }
    }

    pub(crate) fn load_document(&mut self, collection: String, data: Document) -> Result<EntityId> {
        let class = self.registry.resolve(&collection, &data);
        let node = EntityNode::new(collection, String::new(), None, class);
        self.insert_entity(node, data, true)
    }

    /// Loads every document of `collection` matching `filter`.
    pub fn find(&mut self, collection: &str, filter: &Filter) -> Result<Vec<EntityId>> {
        self.store.ensure_connected()?;
        let documents = self.store.find(collection, filter)?;
        tracing::debug!(collection, found = documents.len(), "loaded documents");
        documents
            .into_iter()
            .map(|document| self.load_document(collection.to_string(), document))
            .collect()
    }

    /// Loads the first document of `collection` matching `filter`.
    pub fn find_one(&mut self, collection: &str, filter: &Filter) -> Result<Option<EntityId>> {
        self.store.ensure_connected()?;
        match self.store.find_one(collection, filter)? {
            Some(document) => Ok(Some(self.load_document(collection.to_string(), document)?)),
            None => Ok(None),
        }
    }

    pub fn find_by_id(&mut self, collection: &str, id: impl Into<Value>) -> Result<Option<EntityId>> {
        self.find_one(collection, &id_filter(&id.into()))
    }

    /// Reads `field`.
    ///
    /// Declared properties of the entity's class take precedence over stored
    /// fields. A reference token is resolved on first read and the resolved
    /// entity replaces the token, so later reads return the same node.
    pub fn get(&mut self, entity: EntityId, field: &str) -> Result<Option<Slot>> {
        let class = self.entity_node(entity)?.class.clone();
        if let Some(properties) = class.as_ref().and_then(|class| class.properties()) {
            if properties.declares(field) {
                let getter = properties.getter(field)?;
                return Ok(getter(self, entity)?.map(Slot::Scalar));
            }
        }

        let node = self.entity_node(entity)?;
        let (slot, pending) = match node.pending_set.get(field) {
            Some(slot) => (slot.clone(), true),
            None => match node.lookup(field) {
                Some(slot) => (slot.clone(), false),
                None => return Ok(None),
            },
        };

        let Slot::Reference(reference) = slot else {
            return Ok(Some(slot));
        };
        let resolved = self.resolve(&reference, entity.into())?;
        let node = self.entity_node_mut(entity)?;
        let fields = if pending {
            &mut node.pending_set
        } else {
            &mut node.baseline
        };
        fields.insert(field.to_string(), Slot::Entity(resolved));
        Ok(Some(Slot::Entity(resolved)))
    }

    /// Reads `field` as plain JSON.
    pub fn get_json(&mut self, entity: EntityId, field: &str) -> Result<Option<Value>> {
        match self.get(entity, field)? {
            Some(slot) => Ok(Some(self.to_value(&slot)?)),
            None => Ok(None),
        }
    }

    /// Assigns `value` to `field`.
    ///
    /// Assigning null removes the field. Listeners of the owning document may
    /// replace the value or reject the assignment, in which case nothing
    /// changes. An embedded entity's own listeners run after the owning
    /// document's, addressed by the bare field name.
    ///
    /// An unowned entity or set passed as `value` is taken over by the field.
    /// When a listener replaces or rejects it, it stays with the caller.
    pub fn set(&mut self, entity: EntityId, field: &str, value: impl Into<Assign>) -> Result<()> {
        let value = value.into();
        validate_field_name(field)?;

        let class = self.entity_node(entity)?.class.clone();
        if let Some(properties) = class.as_ref().and_then(|class| class.properties()) {
            if properties.declares(field) {
                let setter = properties.setter(field)?;
                let value = match self.assign_to_value(&value)? {
                    Value::Null => None,
                    value => Some(value),
                };
                return setter(self, entity, value);
            }
        }

        let root = self.document_root(entity.into())?.unwrap_or(entity);
        let event = SetEvent {
            target: entity,
            field: field.to_string(),
            path: join_path(&self.entity_node(entity)?.path, field),
        };
        let mut listeners = vec![(root, event.clone())];
        if root != entity {
            listeners.push((
                entity,
                SetEvent {
                    path: field.to_string(),
                    ..event.clone()
                },
            ));
        }

        let mut proposed = self.assign_to_value(&value)?;
        let mut replaced = false;
        for (bus, event) in &listeners {
            match events::fire_pre_set(self, *bus, event, &proposed)? {
                HookOutcome::Accept => {}
                HookOutcome::Replace(replacement) => {
                    proposed = replacement;
                    replaced = true;
                }
                HookOutcome::Reject => {
                    tracing::debug!(path = %event.path, "assignment rejected by listener");
                    return Ok(());
                }
            }
        }
        let value = if replaced { Assign::Raw(proposed) } else { value };

        let slot = match value {
            Assign::Raw(Value::Null) => return self.remove_field(entity, field),
            Assign::Raw(raw) => self.classify(raw, &event.path, Some(entity.into()), false)?,
            Assign::Entity(id) => self.adopt(id.into(), entity.into(), &event.path)?,
            Assign::Set(id) => self.adopt(id.into(), entity.into(), &event.path)?,
        };
        self.put_pending(entity, field, slot)
    }

    /// Removes `field`.
    pub fn unset(&mut self, entity: EntityId, field: &str) -> Result<()> {
        self.set(entity, field, Value::Null)
    }

    fn put_pending(&mut self, entity: EntityId, field: &str, slot: Slot) -> Result<()> {
        let node = self.entity_node_mut(entity)?;
        node.pending_unset.remove(field);
        let replaced = node.pending_set.insert(field.to_string(), slot.clone());
        if let Some(old) = replaced.and_then(|old| old.node()) {
            if Some(old) != slot.node() {
                self.release(old);
            }
        }
        Ok(())
    }

    fn remove_field(&mut self, entity: EntityId, field: &str) -> Result<()> {
        let node = self.entity_node_mut(entity)?;
        let dropped = node.pending_set.remove(field);
        if node.baseline.contains_key(field) {
            node.pending_unset.insert(field.to_string());
        }
        if let Some(old) = dropped.and_then(|old| old.node()) {
            self.release(old);
        }
        Ok(())
    }

    /// JSON form of an assignment, as seen by listeners and properties.
    fn assign_to_value(&self, value: &Assign) -> Result<Value> {
        match value {
            Assign::Raw(raw) => Ok(raw.clone()),
            Assign::Entity(id) => self.to_value(&Slot::Entity(*id)),
            Assign::Set(id) => self.to_value(&Slot::Set(*id)),
        }
    }

    pub fn contains(&self, entity: EntityId, field: &str) -> Result<bool> {
        Ok(self.entity_node(entity)?.lookup(field).is_some())
    }

    /// Names of the effective fields, sorted.
    pub fn keys(&self, entity: EntityId) -> Result<Vec<String>> {
        Ok(self.entity_node(entity)?.effective().into_keys().collect())
    }

    /// Number of effective fields of an entity, or elements of a set.
    pub fn len(&self, node: impl Into<NodeRef>) -> Result<usize> {
        match node.into() {
            NodeRef::Entity(id) => Ok(self.entity_node(id)?.effective().len()),
            NodeRef::Set(id) => Ok(self.set_node(id)?.elements.len()),
        }
    }

    pub fn is_empty(&self, node: impl Into<NodeRef>) -> Result<bool> {
        Ok(self.len(node)? == 0)
    }

    /// Fields assigned or removed since the last save, sorted.
    pub fn changed_fields(&self, entity: EntityId) -> Result<Vec<String>> {
        let node = self.entity_node(entity)?;
        let mut fields: Vec<String> = node
            .pending_set
            .keys()
            .chain(node.pending_unset.iter())
            .cloned()
            .collect();
        fields.sort();
        fields.dedup();
        Ok(fields)
    }

    /// Persisted identity of `entity`.
    pub fn id(&self, entity: EntityId) -> Result<Option<Value>> {
        Ok(self.entity_node(entity)?.id().cloned())
    }

    /// Collection of a top-level document, logical collection of an embedded one.
    pub fn collection(&self, entity: EntityId) -> Result<&str> {
        Ok(&self.entity_node(entity)?.collection)
    }

    /// Discriminator stamped into `_type` on insert.
    pub fn type_name(&self, entity: EntityId) -> Result<&str> {
        Ok(self.entity_node(entity)?.type_name())
    }

    /// Effective fields with nested nodes kept live.
    pub fn effective_fields(&self, entity: EntityId) -> Result<BTreeMap<String, Slot>> {
        Ok(self.entity_node(entity)?.effective())
    }

    /// Effective fields with nested nodes converted to their stored form.
    ///
    /// References are written as tokens, resolved or not.
    pub fn effective_data(&self, entity: EntityId) -> Result<Map<String, Value>> {
        let mut data = Map::new();
        for (field, slot) in self.entity_node(entity)?.effective() {
            data.insert(field, self.stored_form(&slot)?);
        }
        Ok(data)
    }

    /// Stored form of `entity` when written inside another document.
    pub fn serialize_for_save(&self, entity: EntityId) -> Result<Value> {
        match &self.entity_node(entity)?.reference {
            Some(reference) => Ok(reference.to_value()),
            None => Ok(Value::Object(self.effective_data(entity)?)),
        }
    }

    /// Plain JSON of `slot`.
    ///
    /// Unlike the stored form, a resolved reference shows the data of the
    /// document it points at.
    pub fn to_value(&self, slot: &Slot) -> Result<Value> {
        match slot {
            Slot::Entity(id) => Ok(Value::Object(self.effective_data(*id)?)),
            other => self.stored_form(other),
        }
    }

    pub(crate) fn stored_form(&self, slot: &Slot) -> Result<Value> {
        match slot {
            Slot::Scalar(value) => Ok(value.clone()),
            Slot::Reference(reference) => Ok(reference.to_value()),
            Slot::Entity(id) => self.serialize_for_save(*id),
            Slot::Set(id) => self.set_payload(*id),
        }
    }

    /// Check if `entity` stands in for another stored document.
    pub fn is_reference(&self, entity: EntityId) -> Result<bool> {
        Ok(self.entity_node(entity)?.reference.is_some())
    }

    /// Reference to `entity`, for storing in another document.
    ///
    /// Fails with [`DocumentError::MissingIdentity`] until the entity was saved.
    pub fn reference(&self, entity: EntityId) -> Result<DbRef> {
        let node = self.entity_node(entity)?;
        if let Some(reference) = &node.reference {
            return Ok(reference.clone());
        }
        match node.id() {
            Some(id) => Ok(DbRef::new(node.collection.clone(), id.clone())),
            None => Err(DocumentError::MissingIdentity {
                collection: node.collection.clone(),
            }
            .into()),
        }
    }

    /// Turns a resolved reference into an embedded copy of the document.
    ///
    /// The entity is stored inline from now on, but only once it changes.
    pub fn detach_reference(&mut self, entity: EntityId) -> Result<()> {
        let node = self.entity_node_mut(entity)?;
        if node.reference.take().is_none() {
            return Ok(());
        }
        let path = self.holder_path(entity.into())?;
        if let Some(path) = path {
            self.rebase(entity.into(), &path)?;
        }
        Ok(())
    }

    /// Path of the field or element holding `node`.
    fn holder_path(&self, node: NodeRef) -> Result<Option<String>> {
        match self.parent(node)? {
            Some(NodeRef::Entity(owner)) => {
                let owner = self.entity_node(owner)?;
                Ok(owner
                    .baseline
                    .iter()
                    .chain(owner.pending_set.iter())
                    .find(|(_, slot)| slot.node() == Some(node))
                    .map(|(field, _)| join_path(&owner.path, field)))
            }
            Some(NodeRef::Set(owner)) => {
                let path = &self.set_node(owner)?.path;
                Ok(Some(element_path(path)))
            }
            None => Ok(None),
        }
    }

    /// Deletes the stored document behind `entity`.
    pub fn remove(&mut self, entity: EntityId) -> Result<()> {
        let node = self.entity_node(entity)?;
        let id = node.id().cloned().ok_or_else(|| DocumentError::MissingIdentity {
            collection: node.collection.clone(),
        })?;
        let collection = node.collection.clone();
        self.store.ensure_connected()?;
        tracing::debug!(collection, "removing document");
        self.store.remove(&collection, &id_filter(&id))
    }

    /// Deletes every stored document of `collection` matching `filter`.
    pub fn remove_where(&self, collection: &str, filter: &Filter) -> Result<()> {
        self.store.ensure_connected()?;
        self.store.remove(collection, filter)
    }

    /// Creates an empty set without an owner, to be assigned to a field.
    pub fn create_set(&mut self) -> Result<SetId> {
        self.insert_set("", Vec::new(), None, false)
    }
}
