//! Declared virtual properties.
//!
//! [`Properties`] is a small accessor table: every property has a name and an
//! optional getter and setter. Lookups on undeclared names fail with
//! [`PropertyError::Undefined`], so callers can fall back to plain field access,
//! while a declared property without a setter is read-only.
//!
//! The table hands out the accessor functions instead of invoking them, so a
//! caller holding the table inside the target can release its borrow first.

use std::{collections::BTreeMap, fmt, sync::Arc};

use serde_json::Value;
use thiserror::Error;

use crate::{Result, Session, document::EntityId};

/// Errors raised by the property accessor.
#[non_exhaustive]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PropertyError {
    /// No property with this name is declared.
    #[error("Undefined property '{name}'.")]
    Undefined { name: String },

    /// The property is declared without a setter.
    #[error("Property '{name}' is read-only.")]
    ReadOnly { name: String },

    /// The property is declared without a getter.
    #[error("Undefined getter for property '{name}'.")]
    WriteOnly { name: String },
}

impl PropertyError {
    /// Check if the property is simply not declared.
    pub fn is_undefined(&self) -> bool {
        matches!(self, PropertyError::Undefined { .. })
    }

    /// Name of the property involved.
    pub fn name(&self) -> &str {
        match self {
            PropertyError::Undefined { name }
            | PropertyError::ReadOnly { name }
            | PropertyError::WriteOnly { name } => name,
        }
    }
}

impl From<PropertyError> for crate::Error {
    fn from(err: PropertyError) -> Self {
        crate::Error::Property(err)
    }
}

/// Reads a property of the target identified by `H`.
pub type Getter<T, H, V> = Arc<dyn Fn(&mut T, H) -> Result<V> + Send + Sync>;

/// Writes a property of the target identified by `H`.
pub type Setter<T, H, V> = Arc<dyn Fn(&mut T, H, V) -> Result<()> + Send + Sync>;

/// One declared property.
pub struct Property<T, H, V> {
    getter: Option<Getter<T, H, V>>,
    setter: Option<Setter<T, H, V>>,
}

impl<T, H, V> Clone for Property<T, H, V> {
    fn clone(&self) -> Self {
        Self {
            getter: self.getter.clone(),
            setter: self.setter.clone(),
        }
    }
}

/// A table of declared virtual properties.
pub struct Properties<T, H, V> {
    declared: BTreeMap<String, Property<T, H, V>>,
}

/// Virtual properties of entities, computed from and written to the session.
pub type EntityProperties = Properties<Session, EntityId, Option<Value>>;

impl<T, H, V> Default for Properties<T, H, V> {
    fn default() -> Self {
        Self {
            declared: BTreeMap::new(),
        }
    }
}

impl<T, H, V> Clone for Properties<T, H, V> {
    fn clone(&self) -> Self {
        Self {
            declared: self.declared.clone(),
        }
    }
}

impl<T, H, V> Properties<T, H, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a property with a getter and a setter.
    pub fn read_write<G, S>(mut self, name: impl Into<String>, getter: G, setter: S) -> Self
    where
        G: Fn(&mut T, H) -> Result<V> + Send + Sync + 'static,
        S: Fn(&mut T, H, V) -> Result<()> + Send + Sync + 'static,
    {
        self.declared.insert(
            name.into(),
            Property {
                getter: Some(Arc::new(getter)),
                setter: Some(Arc::new(setter)),
            },
        );
        self
    }

    /// Declares a property with only a getter.
    pub fn read_only<G>(mut self, name: impl Into<String>, getter: G) -> Self
    where
        G: Fn(&mut T, H) -> Result<V> + Send + Sync + 'static,
    {
        self.declared.insert(
            name.into(),
            Property {
                getter: Some(Arc::new(getter)),
                setter: None,
            },
        );
        self
    }

    /// Declares a property with only a setter.
    pub fn write_only<S>(mut self, name: impl Into<String>, setter: S) -> Self
    where
        S: Fn(&mut T, H, V) -> Result<()> + Send + Sync + 'static,
    {
        self.declared.insert(
            name.into(),
            Property {
                getter: None,
                setter: Some(Arc::new(setter)),
            },
        );
        self
    }

    pub fn declares(&self, name: &str) -> bool {
        self.declared.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.declared.keys().map(String::as_str)
    }

    /// Returns the getter of `name`.
    pub fn getter(&self, name: &str) -> std::result::Result<Getter<T, H, V>, PropertyError> {
        let property = self.lookup(name)?;
        property
            .getter
            .clone()
            .ok_or_else(|| PropertyError::WriteOnly {
                name: name.to_string(),
            })
    }

    /// Returns the setter of `name`.
    pub fn setter(&self, name: &str) -> std::result::Result<Setter<T, H, V>, PropertyError> {
        let property = self.lookup(name)?;
        property
            .setter
            .clone()
            .ok_or_else(|| PropertyError::ReadOnly {
                name: name.to_string(),
            })
    }

    /// Reads `name` on `target`.
    pub fn get(&self, target: &mut T, handle: H, name: &str) -> Result<V> {
        let getter = self.getter(name)?;
        getter(target, handle)
    }

    /// Writes `name` on `target`.
    pub fn set(&self, target: &mut T, handle: H, name: &str, value: V) -> Result<()> {
        let setter = self.setter(name)?;
        setter(target, handle, value)
    }

    fn lookup(&self, name: &str) -> std::result::Result<&Property<T, H, V>, PropertyError> {
        self.declared
            .get(name)
            .ok_or_else(|| PropertyError::Undefined {
                name: name.to_string(),
            })
    }
}

impl<T, H, V> fmt::Debug for Properties<T, H, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.declared.keys()).finish()
    }
}
