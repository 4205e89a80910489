use std::{collections::HashSet, sync::Arc};

use serde_json::Value;

use super::CaseInsensitive;
use crate::{
    Result, Session,
    constants::{ID_FIELD, KEYWORDS_FIELD},
    document::EntityId,
    events::{EventBus, PRE_SAVE},
    registry::DocumentClass,
    store::{Filter, IndexSpec},
};

/// Minimum number of characters for a word to become a keyword.
const MIN_KEYWORD_LEN: usize = 3;

/// Splits `text` into lowercase keywords, in order of first appearance.
///
/// Words are runs of alphanumeric characters and underscores; words shorter
/// than three characters are dropped.
pub fn keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|word| word.chars().count() >= MIN_KEYWORD_LEN)
        .map(str::to_lowercase)
        .filter(|word| seen.insert(word.clone()))
        .collect()
}

/// Document class maintaining a `_keywords` list for full-text lookups.
///
/// The list is rebuilt before a save whenever one of the text fields was
/// assigned or removed. Only string values contribute words.
#[derive(Debug, Clone)]
pub struct FullText {
    type_name: String,
    fields: Arc<[String]>,
    case_insensitive: Arc<[String]>,
}

impl FullText {
    pub fn new<I, S>(type_name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            type_name: type_name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            case_insensitive: Vec::new().into(),
        }
    }

    /// Also keeps lowercase variants of `fields`, like [`CaseInsensitive`].
    pub fn with_case_insensitive<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.case_insensitive = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Recomputes `_keywords` of `entity` from its text fields.
    pub fn rebuild(fields: &[String], session: &mut Session, entity: EntityId) -> Result<()> {
        let mut words: Vec<String> = Vec::new();
        for field in fields {
            if let Some(Value::String(text)) = session.get_json(entity, field)? {
                words.extend(keywords(&text));
            }
        }
        let mut seen = HashSet::new();
        words.retain(|word| seen.insert(word.clone()));
        tracing::trace!(keywords = words.len(), "rebuilt keywords");
        session.set(entity, KEYWORDS_FIELD, Value::from(words))
    }

    /// Documents of `collection` containing every keyword of `terms`.
    ///
    /// Terms are lowercased; `base` narrows the search further.
    pub fn search(
        session: &mut Session,
        collection: &str,
        terms: &[&str],
        base: &Filter,
    ) -> Result<Vec<EntityId>> {
        session.store().ensure_connected()?;
        let mut matching: Option<Vec<crate::store::Document>> = None;
        for term in terms {
            let mut filter = base.clone();
            filter.insert(KEYWORDS_FIELD.to_string(), Value::String(term.to_lowercase()));
            let found = session.store().find(collection, &filter)?;
            matching = Some(match matching {
                None => found,
                Some(previous) => {
                    let ids: HashSet<String> = found
                        .iter()
                        .filter_map(|document| document.get(ID_FIELD))
                        .map(Value::to_string)
                        .collect();
                    previous
                        .into_iter()
                        .filter(|document| {
                            document
                                .get(ID_FIELD)
                                .is_some_and(|id| ids.contains(&id.to_string()))
                        })
                        .collect()
                }
            });
        }

        let documents = match matching {
            Some(documents) => documents,
            None => session.store().find(collection, base)?,
        };
        documents
            .into_iter()
            .map(|document| session.load(collection, Value::Object(document)))
            .collect()
    }
}

impl DocumentClass for FullText {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn indexes(&self) -> Vec<IndexSpec> {
        let mut indexes = CaseInsensitive::variant_indexes(&self.case_insensitive);
        indexes.push(IndexSpec::field(KEYWORDS_FIELD));
        indexes
    }

    fn install(&self, events: &mut EventBus) {
        CaseInsensitive::install_variants(&self.case_insensitive, events);

        let fields = self.fields.clone();
        events.on(PRE_SAVE, move |session, entity| {
            let changed = session.changed_fields(entity)?;
            if fields.iter().any(|field| changed.contains(field)) {
                FullText::rebuild(&fields, session, entity)?;
            }
            Ok(())
        });
    }
}
