//! Filter -> query document translation.

use bson::{Bson, Document, Regex};

use crate::schema::ModelSchema;

use super::criterion::{Criterion, CriterionValue, MatchStyle};
use super::envelope::SearchEnvelope;

/// A type whose fields describe a search.
///
/// Usually derived:
///
/// ```ignore
/// #[derive(Filter, Default)]
/// pub struct UserFilter {
///     #[filter(envelope)]
///     pub search: SearchEnvelope,
///     #[filter(match = "prefix", keyword)]
///     pub user_name: Option<String>,
///     pub status: Vec<String>,
///     #[filter(operator = ">=")]
///     pub age: Option<i32>,
/// }
/// ```
pub trait Filter {
    /// Criteria in field declaration order.
    fn criteria(&self) -> Vec<Criterion>;

    /// The embedded search envelope, if the filter has one.
    fn envelope(&self) -> Option<&SearchEnvelope> {
        None
    }
}

/// A query filter plus an optional projection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuiltQuery {
    /// The filter document.
    pub filter: Document,
    /// Inclusion projection; `None` returns whole documents.
    pub projection: Option<Document>,
}

/// Builds query documents for one target model.
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder<'a> {
    schema: &'a ModelSchema,
}

impl<'a> QueryBuilder<'a> {
    /// Creates a builder resolving field names against `schema`.
    pub fn new(schema: &'a ModelSchema) -> Self {
        Self { schema }
    }

    /// Translates a filter into a query document and projection.
    pub fn build<F: Filter + ?Sized>(&self, filter: &F) -> BuiltQuery {
        let envelope = filter.envelope();
        let keyword = envelope.and_then(SearchEnvelope::keyword);

        let mut query = Clauses::default();
        let mut any_of = Vec::new();

        for criterion in filter.criteria() {
            let key = self.storage_key(&criterion);
            match criterion.value {
                CriterionValue::Unset => {}
                CriterionValue::Text(text) if !text.is_empty() => {
                    query.add(key, text_match(&text, criterion.match_style));
                }
                CriterionValue::Text(_) => {
                    if let (Some(keyword), Some(style)) = (keyword, criterion.keyword) {
                        let mut clause = Document::new();
                        clause.insert(key, text_match(keyword, style));
                        any_of.push(Bson::Document(clause));
                    }
                }
                CriterionValue::Set(values) => {
                    let mut clause = Document::new();
                    clause.insert("$in", Bson::Array(values));
                    query.add(key, clause.into());
                }
                CriterionValue::Range(range) => {
                    if let Some(bounds) = range.to_document() {
                        query.add(key, bounds.into());
                    }
                }
                CriterionValue::Scalar(value) => match criterion.operator.key() {
                    None => query.add(key, value),
                    Some(op) => {
                        let mut clause = Document::new();
                        clause.insert(op, value);
                        query.add(key, clause.into());
                    }
                },
            }
        }

        if let Some(envelope) = envelope {
            if !envelope.excluding.is_empty() {
                let ids: Vec<Bson> = envelope
                    .excluding
                    .iter()
                    .map(|id| self.schema.identity_to_store(Bson::String(id.clone())))
                    .collect();
                let mut clause = Document::new();
                clause.insert("$nin", ids);
                query.add(self.schema.identity_key().to_string(), clause.into());
            }
        }

        let mut query = query.finish();
        if !any_of.is_empty() {
            query.insert("$or", any_of);
        }

        BuiltQuery {
            filter: query,
            projection: envelope.and_then(|e| self.projection(&e.fields)),
        }
    }

    /// Inclusion projection for the given read names.
    ///
    /// Returns `None` (all fields) when the list is empty or any name does
    /// not resolve.
    pub fn projection(&self, fields: &[String]) -> Option<Document> {
        if fields.is_empty() {
            return None;
        }
        let mut projection = Document::new();
        for name in fields {
            match self.schema.storage_key(name) {
                Some(key) => {
                    projection.insert(key, 1);
                }
                None => {
                    tracing::debug!(
                        model = self.schema.model_name(),
                        field = %name,
                        "unknown projection field, returning all fields"
                    );
                    return None;
                }
            }
        }
        Some(projection)
    }

    fn storage_key(&self, criterion: &Criterion) -> String {
        criterion
            .storage_key
            .as_deref()
            .or_else(|| self.schema.storage_key(&criterion.field))
            .unwrap_or(&criterion.field)
            .to_string()
    }
}

/// Field clauses of one query.
///
/// Operator documents on the same key are merged when their operators do
/// not overlap; any other repeated key is kept in a trailing `$and`.
#[derive(Debug, Default)]
struct Clauses {
    fields: Document,
    all_of: Vec<Bson>,
}

impl Clauses {
    fn add(&mut self, key: String, clause: Bson) {
        if let (Some(Bson::Document(existing)), Bson::Document(extra)) =
            (self.fields.get_mut(&key), &clause)
        {
            if is_operator_document(existing)
                && is_operator_document(extra)
                && extra.keys().all(|op| !existing.contains_key(op))
            {
                for (op, value) in extra {
                    existing.insert(op.clone(), value.clone());
                }
                return;
            }
        }
        if self.fields.contains_key(&key) {
            let mut extra = Document::new();
            extra.insert(key, clause);
            self.all_of.push(Bson::Document(extra));
        } else {
            self.fields.insert(key, clause);
        }
    }

    fn finish(mut self) -> Document {
        if !self.all_of.is_empty() {
            self.fields.insert("$and", self.all_of);
        }
        self.fields
    }
}

fn is_operator_document(doc: &Document) -> bool {
    !doc.is_empty() && doc.keys().all(|key| key.starts_with('$'))
}

/// The value or pattern matching `text` in the given style.
pub fn text_match(text: &str, style: MatchStyle) -> Bson {
    let pattern = match style {
        MatchStyle::Equal => return Bson::String(text.to_string()),
        MatchStyle::Prefix => format!("^{}", regex::escape(text)),
        MatchStyle::Contain => regex::escape(text),
    };
    Bson::RegularExpression(Regex {
        pattern,
        options: String::new(),
    })
}
