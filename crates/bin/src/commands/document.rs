//! Single-document commands: insert, get, set, unset, remove.

use std::sync::Arc;

use docmap::{EntityId, Session, Store};
use serde_json::{Value, json};

use super::parse_value;
use crate::cli::{GetArgs, InsertArgs, RemoveArgs, SetArgs, Target, UnsetArgs};
use crate::output::{OutputFormat, print_value};

type CommandResult = Result<(), Box<dyn std::error::Error>>;

fn load_target(session: &mut Session, target: &Target) -> Result<EntityId, Box<dyn std::error::Error>> {
    let id = parse_value(&target.id);
    session
        .find_by_id(&target.collection, id)?
        .ok_or_else(|| format!("No document {} in '{}'", target.id, target.collection).into())
}

/// Run the insert command
pub fn insert(store: Arc<dyn Store>, args: &InsertArgs, format: OutputFormat) -> CommandResult {
    let data = match parse_value(&args.document) {
        Value::Object(data) => data,
        other => return Err(format!("Expected a JSON object, got {other}").into()),
    };

    let mut session = Session::new(store);
    let entity = session.create(args.collection.as_str())?;
    for (field, value) in data {
        session.set(entity, &field, value)?;
    }
    session.save(entity)?;

    let id = session.id(entity)?.unwrap_or(Value::Null);
    match format {
        OutputFormat::Human => println!("Inserted {} into '{}'", id, args.collection),
        OutputFormat::Json => print_value(&json!({"inserted": id}), format)?,
    }
    Ok(())
}

/// Run the get command
pub fn get(store: Arc<dyn Store>, args: &GetArgs, format: OutputFormat) -> CommandResult {
    let mut session = Session::new(store);
    let entity = load_target(&mut session, &args.target)?;

    let value = match &args.field {
        Some(field) => session.get_json(entity, field)?.unwrap_or(Value::Null),
        None => Value::Object(session.effective_data(entity)?),
    };
    print_value(&value, format)?;
    Ok(())
}

/// Run the set command
pub fn set(store: Arc<dyn Store>, args: &SetArgs, format: OutputFormat) -> CommandResult {
    let mut session = Session::new(store);
    let entity = load_target(&mut session, &args.target)?;
    session.set(entity, &args.field, parse_value(&args.value))?;
    write(&mut session, entity, args.dry_run, format)
}

/// Run the unset command
pub fn unset(store: Arc<dyn Store>, args: &UnsetArgs, format: OutputFormat) -> CommandResult {
    let mut session = Session::new(store);
    let entity = load_target(&mut session, &args.target)?;
    session.unset(entity, &args.field)?;
    write(&mut session, entity, args.dry_run, format)
}

/// Saves `entity`, or only shows the pending update with `dry_run`.
fn write(session: &mut Session, entity: EntityId, dry_run: bool, format: OutputFormat) -> CommandResult {
    let update = session.preview_update(entity)?.unwrap_or_default();
    if dry_run {
        return Ok(print_value(&update.to_value(), format)?);
    }
    if update.is_empty() {
        tracing::info!("nothing to update");
    }
    session.save(entity)?;
    match format {
        OutputFormat::Human => println!("Updated {} field(s)", update.set.len() + update.unset.len()),
        OutputFormat::Json => print_value(&update.to_value(), format)?,
    }
    Ok(())
}

/// Run the remove command
pub fn remove(store: Arc<dyn Store>, args: &RemoveArgs, format: OutputFormat) -> CommandResult {
    let mut session = Session::new(store);
    let entity = load_target(&mut session, &args.target)?;
    session.remove(entity)?;
    match format {
        OutputFormat::Human => println!("Removed {} from '{}'", args.target.id, args.target.collection),
        OutputFormat::Json => print_value(&json!({"removed": parse_value(&args.target.id)}), format)?,
    }
    Ok(())
}
