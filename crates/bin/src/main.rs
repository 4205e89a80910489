use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod output;
mod store;

use cli::{Cli, Commands};
use output::OutputFormat;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("docmap=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = OutputFormat::from_flag(cli.json);
    let store = store::open_store(&cli.store)?;
    tracing::debug!(store = %store::store_label(&cli.store), "opened store");

    match &cli.command {
        Commands::Insert(args) => commands::document::insert(store, args, format),
        Commands::Get(args) => commands::document::get(store, args, format),
        Commands::Set(args) => commands::document::set(store, args, format),
        Commands::Unset(args) => commands::document::unset(store, args, format),
        Commands::Remove(args) => commands::document::remove(store, args, format),
        Commands::List(args) => commands::list::run(store, args, format),
    }
}
