//! Sort specification parsing.
//!
//! A sort spec is a comma separated list of field names. Each token may carry
//! a leading `+` (ascending, the default) or `-` (descending), or a trailing
//! `asc`/`desc` word:
//!
//! ```
//! use docmap::query::{SortDirection, build_sort};
//! use docmap::schema::{FieldDescriptor, ModelSchema};
//!
//! let schema = ModelSchema::builder("Post")
//!     .field(FieldDescriptor::new(0, "created_at", "createdAt", "created"))
//!     .build()
//!     .unwrap();
//! let keys = build_sort("-createdAt, title asc", &schema);
//! assert_eq!(keys[0].field, "created");
//! assert_eq!(keys[0].direction, SortDirection::Descending);
//! assert_eq!(keys[1].field, "title");
//! ```

use bson::Document;

use crate::schema::ModelSchema;

/// Sort order of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

impl SortDirection {
    /// `1` or `-1`, as used in sort documents.
    pub fn as_i32(self) -> i32 {
        match self {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        }
    }
}

/// A resolved sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Storage key.
    pub field: String,
    /// Direction.
    pub direction: SortDirection,
}

/// Parses a sort spec into storage keys, primary key first.
///
/// Tokens that do not resolve through the schema are used literally. An empty
/// spec yields no keys.
pub fn build_sort(spec: &str, schema: &ModelSchema) -> Vec<SortKey> {
    spec.split(',')
        .filter_map(|token| parse_token(token.trim()))
        .map(|(name, direction)| SortKey {
            field: schema.storage_key(name).unwrap_or(name).to_string(),
            direction,
        })
        .collect()
}

fn parse_token(token: &str) -> Option<(&str, SortDirection)> {
    if token.is_empty() {
        return None;
    }
    if let Some(rest) = token.strip_prefix('-') {
        return non_empty(rest.trim(), SortDirection::Descending);
    }
    if let Some(rest) = token.strip_prefix('+') {
        return non_empty(rest.trim(), SortDirection::Ascending);
    }
    match token.rsplit_once(char::is_whitespace) {
        Some((name, order)) if order.eq_ignore_ascii_case("desc") => {
            non_empty(name.trim(), SortDirection::Descending)
        }
        Some((name, order)) if order.eq_ignore_ascii_case("asc") => {
            non_empty(name.trim(), SortDirection::Ascending)
        }
        _ => Some((token, SortDirection::Ascending)),
    }
}

fn non_empty(name: &str, direction: SortDirection) -> Option<(&str, SortDirection)> {
    (!name.is_empty()).then_some((name, direction))
}

/// The ordered sort document for `keys`, or `None` when there are none.
pub fn sort_document(keys: &[SortKey]) -> Option<Document> {
    if keys.is_empty() {
        return None;
    }
    let mut doc = Document::new();
    for key in keys {
        doc.insert(key.field.clone(), key.direction.as_i32());
    }
    Some(doc)
}
