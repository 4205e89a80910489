//! Lazy resolution of reference tokens.

use super::{DocumentError, EntityId, EntityNode, NodeRef};
use crate::{Result, Session, reference::DbRef};

impl Session {
    /// Fetches the document `reference` points at and materializes it.
    ///
    /// The new entity is owned by `owner` and marked as a reference: it keeps
    /// its own collection and identity, and saving it directly is refused.
    /// Fails with [`DocumentError::BrokenReference`] if the document is gone.
    pub(crate) fn resolve(&mut self, reference: &DbRef, owner: NodeRef) -> Result<EntityId> {
        self.store.ensure_connected()?;
        tracing::debug!(%reference, "resolving reference");
        let document = self
            .store
            .fetch_by_reference(reference)?
            .ok_or_else(|| DocumentError::BrokenReference {
                reference: reference.to_string(),
            })?;

        let class = self.registry.resolve(&reference.collection, &document);
        let mut node = EntityNode::new(reference.collection.clone(), String::new(), Some(owner), class);
        node.reference = Some(reference.clone());
        self.insert_entity(node, document, true)
    }

    /// Resolves `reference` outside of any document.
    pub fn dereference(&mut self, reference: &DbRef) -> Result<EntityId> {
        self.store.ensure_connected()?;
        let document = self
            .store
            .fetch_by_reference(reference)?
            .ok_or_else(|| DocumentError::BrokenReference {
                reference: reference.to_string(),
            })?;
        self.load_document(reference.collection.clone(), document)
    }
}
