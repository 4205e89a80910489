//! Connection configuration and the process-wide default store.
//!
//! Sessions normally receive their store explicitly. For programs that want a
//! single shared store, [`init`] installs one as the process default and
//! [`Session::from_default`](crate::Session::from_default) picks it up;
//! [`reset`] removes it again, which tests use to start from a clean slate.

use std::{
    path::PathBuf,
    sync::{Arc, RwLock},
};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    Result,
    store::{InMemoryStore, Store, StoreError},
};

static DEFAULT_STORE: RwLock<Option<Arc<dyn Store>>> = RwLock::new(None);

/// Installs `store` as the process-wide default, replacing any previous one.
pub fn init(store: Arc<dyn Store>) -> Result<()> {
    let mut default = DEFAULT_STORE.write().map_err(|_| StoreError::LockPoisoned {
        what: "default store",
    })?;
    if default.replace(store).is_some() {
        tracing::info!("replaced default store");
    } else {
        tracing::info!("initialized default store");
    }
    Ok(())
}

/// Removes the process-wide default store.
pub fn reset() -> Result<()> {
    let mut default = DEFAULT_STORE.write().map_err(|_| StoreError::LockPoisoned {
        what: "default store",
    })?;
    *default = None;
    Ok(())
}

/// The process-wide default store.
///
/// Fails with [`StoreError::MissingConnection`] before [`init`].
pub fn default_store() -> Result<Arc<dyn Store>> {
    let default = DEFAULT_STORE.read().map_err(|_| StoreError::LockPoisoned {
        what: "default store",
    })?;
    default
        .clone()
        .ok_or_else(|| StoreError::MissingConnection.into())
}

pub fn is_initialized() -> bool {
    DEFAULT_STORE
        .read()
        .map(|default| default.is_some())
        .unwrap_or(false)
}

/// Where and how to connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Store URI: `memory:`, `file:///path/to/store.json` or `mongodb://host/db`
    pub uri: String,
    /// Database checked against `$db` in references
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_db: Option<String>,
}

/// Backend selected by a [`ConnectionConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Process memory only
    Memory,
    /// In-memory store flushed to a JSON file after every write
    File(PathBuf),
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            uri: "memory:".to_string(),
            default_db: None,
        }
    }
}

impl ConnectionConfig {
    /// Parses `uri`, taking the default database from a trailing `/<name>`.
    ///
    /// The name must start with a letter and contain only letters and digits,
    /// so `file:///data/blog.json` has no default database while
    /// `memory:/blog` and `mongodb://localhost/blog` do.
    pub fn parse(uri: &str) -> Result<Self> {
        Url::parse(uri).map_err(|err| StoreError::InvalidUri {
            uri: uri.to_string(),
            reason: err.to_string(),
        })?;
        Ok(Self {
            uri: uri.to_string(),
            default_db: database_name(uri),
        })
    }

    /// Backend named by the URI scheme.
    pub fn backend(&self) -> Result<Backend> {
        let url = Url::parse(&self.uri).map_err(|err| StoreError::InvalidUri {
            uri: self.uri.clone(),
            reason: err.to_string(),
        })?;
        match url.scheme() {
            "memory" => Ok(Backend::Memory),
            "file" => url
                .to_file_path()
                .map(Backend::File)
                .map_err(|_| {
                    StoreError::InvalidUri {
                        uri: self.uri.clone(),
                        reason: "not a local file path".to_string(),
                    }
                    .into()
                }),
            scheme => Err(StoreError::UnsupportedBackend {
                scheme: scheme.to_string(),
            }
            .into()),
        }
    }
}

/// Trailing database name of `uri`, if any.
fn database_name(uri: &str) -> Option<String> {
    let (_, name) = uri.rsplit_once('/')?;
    let mut chars = name.chars();
    let first = chars.next()?;
    if first.is_ascii_alphabetic() && chars.all(|c| c.is_ascii_alphanumeric()) {
        Some(name.to_string())
    } else {
        None
    }
}

/// Opens the store described by `config`.
///
/// The connection itself is established lazily on first use.
pub fn open(config: &ConnectionConfig) -> Result<Arc<dyn Store>> {
    let store = match config.backend()? {
        Backend::Memory => match &config.default_db {
            Some(database) => InMemoryStore::with_database(database.clone()),
            None => InMemoryStore::new(),
        },
        Backend::File(path) => {
            tracing::info!(path = %path.display(), "opening file store");
            InMemoryStore::open_file(path)?
        }
    };
    Ok(Arc::new(store))
}
