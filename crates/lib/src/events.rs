//! Named events fired by entities during mutation and persistence.
//!
//! Every entity carries an [`EventBus`]. Document classes install their listeners
//! on it when an entity is constructed, and callers can add more through
//! [`Session::events_mut`](crate::Session::events_mut).
//!
//! Two kinds of listeners exist:
//!
//! - **Set hooks** run before a field assignment is committed to pending state.
//!   They receive the proposed value and answer with a [`HookOutcome`]: accept it,
//!   replace it, or reject the assignment.
//! - **Lifecycle hooks** run around a save (`pre-save`, `pre-insert`,
//!   `pre-update`, `post-save`, `post-insert`, `post-update`) and receive the
//!   entity being saved, which they may still mutate in the `pre-*` phase.
//!
//! Field events of nested entities are addressed with their placeholder path
//! (`pre-set-items.$.title`) and fire on the owning document's bus. The nested
//! entity's own bus then sees the same assignment as `pre-set-title`, so a
//! class mapped to an embedded collection keeps its listeners working.

use std::{collections::HashMap, fmt, sync::Arc};

use serde_json::Value;

use crate::{Result, Session, document::EntityId};

/// Fired before any field assignment.
pub const PRE_SET: &str = "pre-set";
/// Fired before a document is persisted.
pub const PRE_SAVE: &str = "pre-save";
/// Fired before a document is inserted.
pub const PRE_INSERT: &str = "pre-insert";
/// Fired before a document is updated.
pub const PRE_UPDATE: &str = "pre-update";
/// Fired after a document was persisted.
pub const POST_SAVE: &str = "post-save";
/// Fired after a document was inserted.
pub const POST_INSERT: &str = "post-insert";
/// Fired after a document was updated.
pub const POST_UPDATE: &str = "post-update";

/// Name of the field-specific pre-set event for `path`.
pub fn pre_set_field(path: &str) -> String {
    format!("{PRE_SET}-{path}")
}

/// Context of a pending field assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetEvent {
    /// Entity the field belongs to
    pub target: EntityId,
    /// Field name on the target
    pub field: String,
    /// Field path relative to the document the event fires on
    pub path: String,
}

/// Answer of a set hook to a proposed value.
#[derive(Debug, Clone, PartialEq)]
pub enum HookOutcome {
    /// Keep the proposed value.
    Accept,
    /// Use this value instead.
    Replace(Value),
    /// Drop the assignment.
    Reject,
}

/// Listener for `pre-set` events.
pub type SetHook =
    Arc<dyn Fn(&mut Session, &SetEvent, &Value) -> Result<HookOutcome> + Send + Sync>;

/// Listener for save lifecycle events.
pub type LifecycleHook = Arc<dyn Fn(&mut Session, EntityId) -> Result<()> + Send + Sync>;

/// Named listeners attached to one entity.
#[derive(Clone, Default)]
pub struct EventBus {
    set_hooks: HashMap<String, Vec<SetHook>>,
    lifecycle_hooks: HashMap<String, Vec<LifecycleHook>>,
}

impl EventBus {
    /// Create a new empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a set hook to `name` (`pre-set` or `pre-set-<path>`).
    pub fn on_set<F>(&mut self, name: impl Into<String>, hook: F)
    where
        F: Fn(&mut Session, &SetEvent, &Value) -> Result<HookOutcome> + Send + Sync + 'static,
    {
        self.set_hooks
            .entry(name.into())
            .or_default()
            .push(Arc::new(hook));
    }

    /// Attach a lifecycle hook to `name`.
    pub fn on<F>(&mut self, name: impl Into<String>, hook: F)
    where
        F: Fn(&mut Session, EntityId) -> Result<()> + Send + Sync + 'static,
    {
        self.lifecycle_hooks
            .entry(name.into())
            .or_default()
            .push(Arc::new(hook));
    }

    /// Set hooks registered under `name`, in registration order.
    pub fn set_hooks(&self, name: &str) -> Vec<SetHook> {
        self.set_hooks.get(name).cloned().unwrap_or_default()
    }

    /// Lifecycle hooks registered under `name`, in registration order.
    pub fn lifecycle_hooks(&self, name: &str) -> Vec<LifecycleHook> {
        self.lifecycle_hooks.get(name).cloned().unwrap_or_default()
    }

    /// Check if there are any hooks registered.
    pub fn has_hooks(&self) -> bool {
        !self.is_empty()
    }

    /// Total number of registered hooks.
    pub fn len(&self) -> usize {
        self.set_hooks.values().map(Vec::len).sum::<usize>()
            + self.lifecycle_hooks.values().map(Vec::len).sum::<usize>()
    }

    /// Check if the bus is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("set_events", &self.set_hooks.keys().collect::<Vec<_>>())
            .field(
                "lifecycle_events",
                &self.lifecycle_hooks.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Runs the lifecycle hooks named `name` registered on `entity`.
pub(crate) fn fire(session: &mut Session, entity: EntityId, name: &str) -> Result<()> {
    let hooks = session.entity_events(entity)?.lifecycle_hooks(name);
    if !hooks.is_empty() {
        tracing::trace!(event = name, hooks = hooks.len(), "firing lifecycle event");
    }
    for hook in hooks {
        hook(session, entity)?;
    }
    Ok(())
}

/// Runs `pre-set` and `pre-set-<path>` on `entity`, threading the proposed value
/// through every listener.
///
/// The combined outcome is [`HookOutcome::Accept`] when no listener changed
/// the value.
pub(crate) fn fire_pre_set(
    session: &mut Session,
    entity: EntityId,
    event: &SetEvent,
    value: &Value,
) -> Result<HookOutcome> {
    let bus = session.entity_events(entity)?;
    let hooks: Vec<SetHook> = bus
        .set_hooks(PRE_SET)
        .into_iter()
        .chain(bus.set_hooks(&pre_set_field(&event.path)))
        .collect();

    let mut replaced: Option<Value> = None;
    for hook in hooks {
        let current = replaced.as_ref().unwrap_or(value);
        match hook(session, event, current)? {
            HookOutcome::Accept => {}
            HookOutcome::Replace(replacement) => {
                tracing::trace!(path = %event.path, "set hook replaced value");
                replaced = Some(replacement);
            }
            HookOutcome::Reject => return Ok(HookOutcome::Reject),
        }
    }
    Ok(replaced.map_or(HookOutcome::Accept, HookOutcome::Replace))
}
