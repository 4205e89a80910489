//! Ordered sets.
//!
//! A set is persisted as a whole: any change to it, or to anything it holds,
//! rewrites the complete array on the next save.

use serde_json::Value;

use super::{Assign, DocumentError, NodeRef, SetId, Slot};
use crate::{Result, Session, constants::element_path};

impl Session {
    /// Element at `index`, or `None` past the end.
    ///
    /// Reference tokens are resolved on first read and replaced by the
    /// resolved entity.
    pub fn element(&mut self, set: SetId, index: usize) -> Result<Option<Slot>> {
        let Some(slot) = self.set_node(set)?.elements.get(index).cloned() else {
            return Ok(None);
        };
        let Slot::Reference(reference) = slot else {
            return Ok(Some(slot));
        };
        let resolved = self.resolve(&reference, set.into())?;
        self.set_node_mut(set)?.elements[index] = Slot::Entity(resolved);
        Ok(Some(Slot::Entity(resolved)))
    }

    /// Every element, with references resolved.
    pub fn elements(&mut self, set: SetId) -> Result<Vec<Slot>> {
        let len = self.set_node(set)?.elements.len();
        let mut elements = Vec::with_capacity(len);
        for index in 0..len {
            if let Some(slot) = self.element(set, index)? {
                elements.push(slot);
            }
        }
        Ok(elements)
    }

    /// Every element as plain JSON, without resolving references.
    pub fn elements_json(&self, set: SetId) -> Result<Vec<Value>> {
        let elements = self.set_node(set)?.elements.clone();
        elements.iter().map(|slot| self.to_value(slot)).collect()
    }

    /// Replaces the element at `index`.
    ///
    /// Writing at `index == len` appends. Null is stored as an element, it
    /// does not remove anything.
    pub fn set_element(&mut self, set: SetId, index: usize, value: impl Into<Assign>) -> Result<()> {
        let len = self.set_node(set)?.elements.len();
        if index > len {
            return Err(DocumentError::IndexOutOfBounds { index, len }.into());
        }
        let slot = self.element_slot(set, value.into())?;
        let node = self.set_node_mut(set)?;
        node.modified = true;
        if index == len {
            node.elements.push(slot);
            return Ok(());
        }
        let old = std::mem::replace(&mut node.elements[index], slot);
        if let Some(old) = old.node() {
            self.release(old);
        }
        Ok(())
    }

    /// Appends `value`, returning its index.
    pub fn append(&mut self, set: SetId, value: impl Into<Assign>) -> Result<usize> {
        let slot = self.element_slot(set, value.into())?;
        let node = self.set_node_mut(set)?;
        node.modified = true;
        node.elements.push(slot);
        Ok(node.elements.len() - 1)
    }

    /// Inserts `value` before `index`, shifting later elements.
    pub fn insert_element(&mut self, set: SetId, index: usize, value: impl Into<Assign>) -> Result<()> {
        let len = self.set_node(set)?.elements.len();
        if index > len {
            return Err(DocumentError::IndexOutOfBounds { index, len }.into());
        }
        let slot = self.element_slot(set, value.into())?;
        let node = self.set_node_mut(set)?;
        node.modified = true;
        node.elements.insert(index, slot);
        Ok(())
    }

    /// Removes the element at `index`, shifting later elements.
    pub fn remove_element(&mut self, set: SetId, index: usize) -> Result<()> {
        let node = self.set_node_mut(set)?;
        let len = node.elements.len();
        if index >= len {
            return Err(DocumentError::IndexOutOfBounds { index, len }.into());
        }
        node.modified = true;
        let old = node.elements.remove(index);
        if let Some(old) = old.node() {
            self.release(old);
        }
        Ok(())
    }

    /// Removes every element.
    pub fn clear(&mut self, set: SetId) -> Result<()> {
        let node = self.set_node_mut(set)?;
        let old = std::mem::take(&mut node.elements);
        node.modified = true;
        for child in old.iter().filter_map(Slot::node) {
            self.release(child);
        }
        Ok(())
    }

    fn element_slot(&mut self, set: SetId, value: Assign) -> Result<Slot> {
        let path = element_path(&self.set_node(set)?.path);
        match value {
            Assign::Raw(raw) => self.classify(raw, &path, Some(set.into()), false),
            Assign::Entity(id) => self.adopt(NodeRef::Entity(id), set.into(), &path),
            Assign::Set(id) => self.adopt(NodeRef::Set(id), set.into(), &path),
        }
    }

    /// Stored form of `set` for an update command.
    ///
    /// Returns `None` when nothing in the set changed and `force` is off.
    pub fn serialize_set_for_save(&self, set: SetId, force: bool) -> Result<Option<Value>> {
        if !force && !self.is_dirty(NodeRef::Set(set))? {
            return Ok(None);
        }
        Ok(Some(self.set_payload(set)?))
    }

    /// Every element in stored form, in order.
    ///
    /// Nested sets are always written out in full: an array element cannot be
    /// omitted. Embedded entities are written inline, resolved references as
    /// their token, the same as reference fields of an entity.
    pub(crate) fn set_payload(&self, set: SetId) -> Result<Value> {
        let node = self.set_node(set)?;
        let mut items = Vec::with_capacity(node.elements.len());
        for slot in &node.elements {
            items.push(self.stored_form(slot)?);
        }
        Ok(Value::Array(items))
    }
}
