use std::sync::Arc;

use serde_json::Value;

use crate::{
    constants::CASE_INSENSITIVE_PREFIX,
    events::{EventBus, HookOutcome, pre_set_field},
    registry::DocumentClass,
    store::{Filter, IndexSpec},
};

/// Document class keeping lowercase variants of some fields.
///
/// Assigning a string to one of the fields also assigns its lowercase form to
/// `_ci_<field>`; assigning anything else removes the variant.
#[derive(Debug, Clone)]
pub struct CaseInsensitive {
    type_name: String,
    fields: Arc<[String]>,
}

impl CaseInsensitive {
    pub fn new<I, S>(type_name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            type_name: type_name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Name of the lowercase variant of `field`.
    pub fn variant(field: &str) -> String {
        format!("{CASE_INSENSITIVE_PREFIX}{field}")
    }

    /// Filter matching documents whose `field` equals `value`, ignoring case.
    pub fn filter(field: &str, value: &str) -> Filter {
        let mut filter = Filter::new();
        filter.insert(Self::variant(field), Value::String(value.to_lowercase()));
        filter
    }

    /// Registers the variant-maintaining listeners on `events`.
    pub(crate) fn install_variants(fields: &[String], events: &mut EventBus) {
        for field in fields {
            let variant = Self::variant(field);
            events.on_set(pre_set_field(field), move |session, event, value| {
                match value.as_str() {
                    Some(text) => session.set(event.target, &variant, text.to_lowercase())?,
                    None => session.unset(event.target, &variant)?,
                }
                Ok(HookOutcome::Accept)
            });
        }
    }

    pub(crate) fn variant_indexes(fields: &[String]) -> Vec<IndexSpec> {
        fields
            .iter()
            .map(|field| IndexSpec::field(Self::variant(field)))
            .collect()
    }
}

impl DocumentClass for CaseInsensitive {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn indexes(&self) -> Vec<IndexSpec> {
        Self::variant_indexes(&self.fields)
    }

    fn install(&self, events: &mut EventBus) {
        Self::install_variants(&self.fields, events);
    }
}
