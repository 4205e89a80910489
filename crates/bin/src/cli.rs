//! CLI argument definitions for the docmap binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// docmap document store tool
#[derive(Parser, Debug)]
#[command(name = "docmap")]
#[command(about = "docmap: inspect and edit mapped documents")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Print machine-readable JSON instead of human-readable output
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where documents are read from and written to
#[derive(clap::Args, Debug)]
pub struct StoreArgs {
    /// Store URI (`memory:`, `file:///path/store.json`)
    #[arg(long, default_value = "memory:", env = "DOCMAP_STORE", global = true)]
    pub store: String,

    /// JSON file backing the store; overrides --store
    #[arg(short = 'D', long, env = "DOCMAP_DATA", global = true)]
    pub data: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Insert a new document
    Insert(InsertArgs),
    /// Show a document or one of its fields
    Get(GetArgs),
    /// Assign a field of a document
    Set(SetArgs),
    /// Remove a field of a document
    Unset(UnsetArgs),
    /// Delete a document
    Remove(RemoveArgs),
    /// List the documents of a collection
    List(ListArgs),
}

/// Identifies one stored document
#[derive(clap::Args, Debug)]
pub struct Target {
    /// Collection name
    pub collection: String,

    /// Document identity (JSON, or a bare string)
    pub id: String,
}

#[derive(clap::Args, Debug)]
pub struct InsertArgs {
    /// Collection name
    pub collection: String,

    /// Document as a JSON object
    pub document: String,
}

#[derive(clap::Args, Debug)]
pub struct GetArgs {
    #[command(flatten)]
    pub target: Target,

    /// Field to show; references are followed
    pub field: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct SetArgs {
    #[command(flatten)]
    pub target: Target,

    /// Field name
    pub field: String,

    /// New value (JSON, or a bare string)
    pub value: String,

    /// Print the update that would be sent instead of saving
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(clap::Args, Debug)]
pub struct UnsetArgs {
    #[command(flatten)]
    pub target: Target,

    /// Field name
    pub field: String,

    /// Print the update that would be sent instead of saving
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(clap::Args, Debug)]
pub struct RemoveArgs {
    #[command(flatten)]
    pub target: Target,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Collection name
    pub collection: String,

    /// Equality clause `field=value`; may be repeated
    #[arg(long = "where", value_name = "FIELD=VALUE")]
    pub filters: Vec<String>,
}
