//! List command - shows the documents of a collection.

use std::{collections::BTreeSet, sync::Arc};

use docmap::{Session, Store, constants::ID_FIELD, store::Filter};
use serde_json::Value;

use super::parse_value;
use crate::cli::ListArgs;
use crate::output::{OutputFormat, cell, print_table, print_value};

/// Builds an equality filter from `field=value` clauses.
pub fn parse_filter(clauses: &[String]) -> Result<Filter, String> {
    let mut filter = Filter::new();
    for clause in clauses {
        let (field, value) = clause
            .split_once('=')
            .ok_or_else(|| format!("Invalid filter '{clause}': expected FIELD=VALUE"))?;
        filter.insert(field.trim().to_string(), parse_value(value.trim()));
    }
    Ok(filter)
}

/// Run the list command
pub fn run(store: Arc<dyn Store>, args: &ListArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let filter = parse_filter(&args.filters)?;
    let mut session = Session::new(store);
    let entities = session.find(&args.collection, &filter)?;

    let mut documents = Vec::with_capacity(entities.len());
    for entity in entities {
        documents.push(session.effective_data(entity)?);
    }

    match format {
        OutputFormat::Json => {
            let value = Value::Array(documents.into_iter().map(Value::Object).collect());
            print_value(&value, format)?;
        }
        OutputFormat::Human => {
            if documents.is_empty() {
                println!("No documents in '{}'", args.collection);
                return Ok(());
            }
            let mut headers = vec![ID_FIELD.to_string()];
            let fields: BTreeSet<&String> = documents
                .iter()
                .flat_map(|document| document.keys())
                .filter(|field| field.as_str() != ID_FIELD)
                .collect();
            headers.extend(fields.iter().map(|field| field.to_string()));

            let rows: Vec<Vec<String>> = documents
                .iter()
                .map(|document| {
                    headers
                        .iter()
                        .map(|field| document.get(field).map(cell).unwrap_or_default())
                        .collect()
                })
                .collect();
            print_table(&headers, &rows);
        }
    }
    Ok(())
}
