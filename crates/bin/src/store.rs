//! Opening the store selected on the command line.

use std::sync::Arc;

use docmap::{
    InMemoryStore, Store,
    connection::{self, ConnectionConfig},
};

use crate::cli::StoreArgs;

/// Opens the store named by `--data` or `--store`.
pub fn open_store(args: &StoreArgs) -> docmap::Result<Arc<dyn Store>> {
    if let Some(path) = &args.data {
        tracing::debug!(path = %path.display(), "using data file");
        return Ok(Arc::new(InMemoryStore::open_file(path)?));
    }
    let config = ConnectionConfig::parse(&args.store)?;
    if config.uri.starts_with("memory:") {
        tracing::warn!("using an in-memory store; changes are discarded on exit");
    }
    connection::open(&config)
}

/// Human description of the selected store.
pub fn store_label(args: &StoreArgs) -> String {
    match &args.data {
        Some(path) => format!("file {}", path.display()),
        None => args.store.clone(),
    }
}
