//! Persisting entities.
//!
//! A document without identity is inserted whole. A persisted document is
//! diffed against its baseline and written with a single partial update:
//!
//! - every pending assignment goes to `$set`, nested nodes in stored form;
//! - baseline sets go to `$set` when anything inside them changed;
//! - baseline embedded entities go to `$set` when anything inside them
//!   changed (resolved references are separate documents and never written);
//! - every pending removal goes to `$unset`.
//!
//! After the store accepted the write, the new state becomes the baseline of
//! the document and of everything embedded in it.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

use super::{DocumentError, EntityId, NodeRef, Slot};
use crate::{
    Result, Session,
    constants::{ID_FIELD, TYPE_FIELD},
    events::{self, POST_INSERT, POST_SAVE, POST_UPDATE, PRE_INSERT, PRE_SAVE, PRE_UPDATE},
    store::{UpdateCommand, id_filter},
};

impl Session {
    /// Persists `entity`, or the document it is embedded in.
    ///
    /// Returns the entity that was written: `entity` itself for top-level
    /// documents, the owning document for embedded ones.
    ///
    /// # Errors
    /// - [`DocumentError::CannotSaveReference`] when `entity` is a resolved
    ///   reference or embedded in one
    /// - [`DocumentError::InvalidDocumentSet`] when the graph is rooted at a set
    /// - any store error, in which case nothing is committed
    pub fn save(&mut self, entity: EntityId) -> Result<EntityId> {
        let target = self.persist_target(entity)?;
        if target != entity {
            tracing::debug!(collection = %self.entity_node(target)?.collection, "saving owning document");
            return self.save(target);
        }

        self.store.ensure_connected()?;
        let is_insert = self.entity_node(entity)?.id().is_none();
        events::fire(self, entity, PRE_SAVE)?;
        events::fire(self, entity, if is_insert { PRE_INSERT } else { PRE_UPDATE })?;

        let node = self.entity_node(entity)?;
        let collection = node.collection.clone();
        let mut baseline = node.effective();
        if is_insert {
            let type_name = Value::String(node.type_name().to_string());
            let mut document = self.effective_data(entity)?;
            document.insert(TYPE_FIELD.to_string(), type_name.clone());
            tracing::debug!(collection, "inserting document");
            let id = self.store.insert(&collection, document)?;
            baseline.insert(ID_FIELD.to_string(), Slot::Scalar(id));
            baseline.insert(TYPE_FIELD.to_string(), Slot::Scalar(type_name));
        } else {
            let command = self.build_update(entity)?;
            if command.is_empty() {
                tracing::trace!(collection, "no changes to write");
            } else {
                let id = self.id(entity)?.unwrap_or(Value::Null);
                tracing::debug!(
                    collection,
                    set = command.set.len(),
                    unset = command.unset.len(),
                    "updating document"
                );
                self.store.update(&collection, &id_filter(&id), &command)?;
            }
        }
        self.commit(entity, baseline)?;

        events::fire(self, entity, POST_SAVE)?;
        events::fire(self, entity, if is_insert { POST_INSERT } else { POST_UPDATE })?;
        Ok(entity)
    }

    /// The update the next save of `entity` would send.
    ///
    /// Follows the same delegation as [`save`](Self::save). Returns `None`
    /// when the document has no identity yet and would be inserted.
    pub fn preview_update(&self, entity: EntityId) -> Result<Option<UpdateCommand>> {
        let target = self.persist_target(entity)?;
        if self.entity_node(target)?.id().is_none() {
            return Ok(None);
        }
        Ok(Some(self.build_update(target)?))
    }

    /// Entity a save of `entity` is carried out on.
    ///
    /// Walks the owner chain up to the top-level document. A resolved
    /// reference on the way belongs to another document and ends the walk
    /// with [`DocumentError::CannotSaveReference`].
    fn persist_target(&self, entity: EntityId) -> Result<EntityId> {
        let node = self.entity_node(entity)?;
        if node.parent.is_none() || node.id().is_some() {
            self.ensure_not_reference(entity)?;
            return Ok(entity);
        }

        let mut current = NodeRef::Entity(entity);
        loop {
            if let NodeRef::Entity(id) = current {
                self.ensure_not_reference(id)?;
            }
            match self.parent(current)? {
                Some(parent) => current = parent,
                None => break,
            }
        }
        match current {
            NodeRef::Entity(root) => Ok(root),
            NodeRef::Set(set) => Err(DocumentError::InvalidDocumentSet {
                path: self.set_node(set)?.path.clone(),
            }
            .into()),
        }
    }

    fn ensure_not_reference(&self, entity: EntityId) -> Result<()> {
        match &self.entity_node(entity)?.reference {
            Some(reference) => Err(DocumentError::CannotSaveReference {
                reference: reference.to_string(),
            }
            .into()),
            None => Ok(()),
        }
    }

    /// Diff of `entity` against its baseline.
    pub(crate) fn build_update(&self, entity: EntityId) -> Result<UpdateCommand> {
        let node = self.entity_node(entity)?;
        let mut command = UpdateCommand::new();

        for (field, slot) in &node.pending_set {
            let value = match slot {
                Slot::Set(set) => self.set_payload(*set)?,
                other => self.stored_form(other)?,
            };
            command.set_field(field.clone(), value);
        }

        let untouched = node
            .baseline
            .iter()
            .filter(|(field, _)| !node.pending_set.contains_key(*field))
            .filter(|(field, _)| !node.pending_unset.contains(*field));
        for (field, slot) in untouched {
            match slot {
                Slot::Set(set) => {
                    if let Some(value) = self.serialize_set_for_save(*set, false)? {
                        command.set_field(field.clone(), value);
                    }
                }
                Slot::Entity(child) => {
                    if !self.is_reference(*child)? && self.has_changes(*child)? {
                        command.set_field(field.clone(), Value::Object(self.effective_data(*child)?));
                    }
                }
                Slot::Scalar(_) | Slot::Reference(_) => {}
            }
        }

        for field in &node.pending_unset {
            command.unset_field(field.clone());
        }
        Ok(command)
    }

    /// Makes `fields` the baseline of `entity` and clears pending state,
    /// recursively for everything embedded.
    fn commit(&mut self, entity: EntityId, fields: BTreeMap<String, Slot>) -> Result<()> {
        let node = self.entity_node_mut(entity)?;
        let previous = std::mem::replace(&mut node.baseline, fields);
        node.pending_set.clear();
        node.pending_unset.clear();

        let kept: HashSet<NodeRef> = node.baseline.values().filter_map(Slot::node).collect();
        for stale in previous.values().filter_map(Slot::node) {
            if !kept.contains(&stale) {
                self.release(stale);
            }
        }
        for child in kept {
            self.commit_node(child)?;
        }
        Ok(())
    }

    fn commit_node(&mut self, node: NodeRef) -> Result<()> {
        match node {
            NodeRef::Entity(id) => {
                let entity = self.entity_node(id)?;
                if entity.reference.is_some() {
                    return Ok(());
                }
                let fields = entity.effective();
                self.commit(id, fields)
            }
            NodeRef::Set(id) => {
                let set = self.set_node_mut(id)?;
                set.modified = false;
                let children: Vec<NodeRef> = set.elements.iter().filter_map(Slot::node).collect();
                for child in children {
                    self.commit_node(child)?;
                }
                Ok(())
            }
        }
    }
}
