//! Update, projection and sort application for the in-memory backend.

use std::cmp::Ordering;

use bson::{Bson, Document};

use crate::error::QueryError;

use super::matcher::{compare, lookup};

fn invalid(message: impl Into<String>) -> QueryError {
    QueryError::InvalidUpdate {
        message: message.into(),
    }
}

/// Applies an operator update (`$set`, `$unset`, `$inc`) to `doc`.
///
/// `$setOnInsert` is only honoured by [`seed_upsert`].
pub(crate) fn apply_update(doc: &mut Document, update: &Document) -> Result<(), QueryError> {
    if update.is_empty() {
        return Err(invalid("update document is empty"));
    }
    for (op, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(invalid(format!("{op} expects a document")));
        };
        match op.as_str() {
            "$set" => {
                for (path, value) in fields {
                    set_path(doc, path, value.clone())?;
                }
            }
            "$unset" => {
                for (path, _) in fields {
                    unset_path(doc, path);
                }
            }
            "$inc" => {
                for (path, delta) in fields {
                    let current = lookup(doc, path).cloned().unwrap_or(Bson::Int32(0));
                    set_path(doc, path, increment(path, &current, delta)?)?;
                }
            }
            "$setOnInsert" => {}
            other if other.starts_with('$') => {
                return Err(QueryError::UnsupportedOperator {
                    operator: other.to_string(),
                });
            }
            other => return Err(invalid(format!("'{other}' is not an update operator"))),
        }
    }
    Ok(())
}

/// Builds the document an upsert inserts when nothing matched.
///
/// Plain equality conditions of the filter seed the document; the update is
/// then applied on top, including `$setOnInsert`.
pub(crate) fn seed_upsert(filter: &Document, update: &Document) -> Result<Document, QueryError> {
    let mut doc = equality_seed(filter);
    apply_update(&mut doc, update)?;
    if let Ok(on_insert) = update.get_document("$setOnInsert") {
        for (path, value) in on_insert {
            set_path(&mut doc, path, value.clone())?;
        }
    }
    Ok(doc)
}

/// Top-level equality conditions of a filter.
pub(crate) fn equality_seed(filter: &Document) -> Document {
    let mut seed = Document::new();
    for (key, condition) in filter {
        if key.starts_with('$') || key.contains('.') {
            continue;
        }
        match condition {
            Bson::RegularExpression(_) => {}
            Bson::Document(ops) if ops.keys().any(|k| k.starts_with('$')) => {
                if let Some(value) = ops.get("$eq") {
                    seed.insert(key.clone(), value.clone());
                }
            }
            value => {
                seed.insert(key.clone(), value.clone());
            }
        }
    }
    seed
}

fn increment(path: &str, current: &Bson, delta: &Bson) -> Result<Bson, QueryError> {
    Ok(match (current, delta) {
        (Bson::Int32(a), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(i64::from(*a) + i64::from(*b)),
        },
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(i64::from(*a).saturating_add(*b)),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a.saturating_add(i64::from(*b))),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a.saturating_add(*b)),
        (Bson::Double(a), Bson::Double(b)) => Bson::Double(a + b),
        (Bson::Double(a), Bson::Int32(b)) => Bson::Double(a + f64::from(*b)),
        (Bson::Double(a), Bson::Int64(b)) => Bson::Double(a + *b as f64),
        (Bson::Int32(a), Bson::Double(b)) => Bson::Double(f64::from(*a) + b),
        (Bson::Int64(a), Bson::Double(b)) => Bson::Double(*a as f64 + b),
        _ => return Err(invalid(format!("cannot increment non-numeric field '{path}'"))),
    })
}

fn set_path(doc: &mut Document, path: &str, value: Bson) -> Result<(), QueryError> {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            let child = doc
                .entry(head.to_string())
                .or_insert_with(|| Bson::Document(Document::new()));
            match child {
                Bson::Document(inner) => set_path(inner, rest, value),
                _ => Err(invalid(format!("'{head}' is not a document"))),
            }
        }
    }
}

fn unset_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = doc.get_mut(head) {
                unset_path(inner, rest);
            }
        }
    }
}

/// Applies a projection document.
///
/// Inclusion projections keep `_id` unless it is explicitly excluded; a
/// projection made only of exclusions removes the named fields.
pub(crate) fn project(doc: Document, projection: &Document) -> Document {
    let included: Vec<&str> = projection
        .iter()
        .filter(|(key, flag)| key.as_str() != "_id" && is_included(flag))
        .map(|(key, _)| key.as_str())
        .collect();
    let keep_id = projection.get("_id").is_none_or(is_included);

    if included.is_empty() {
        let mut doc = doc;
        for (key, flag) in projection {
            if !is_included(flag) {
                doc.remove(key);
            }
        }
        return doc;
    }

    let mut projected = Document::new();
    if keep_id {
        if let Some(id) = doc.get("_id") {
            projected.insert("_id", id.clone());
        }
    }
    for key in included {
        if let Some(value) = doc.get(key) {
            projected.insert(key, value.clone());
        }
    }
    projected
}

fn is_included(flag: &Bson) -> bool {
    match flag {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        _ => true,
    }
}

/// Sorts documents by a sort document; missing fields order first.
pub(crate) fn sort_documents(docs: &mut [Document], sort: &Document) {
    let keys: Vec<(&str, bool)> = sort
        .iter()
        .map(|(key, direction)| (key.as_str(), is_ascending(direction)))
        .collect();
    docs.sort_by(|a, b| {
        for (key, ascending) in &keys {
            let ordering = order_values(lookup(a, key), lookup(b, key));
            let ordering = if *ascending { ordering } else { ordering.reverse() };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::Null | Bson::Undefined => 0,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 1,
        Bson::String(_) | Bson::Symbol(_) => 2,
        Bson::Document(_) => 3,
        Bson::Array(_) => 4,
        Bson::Binary(_) => 5,
        Bson::ObjectId(_) => 6,
        Bson::Boolean(_) => 7,
        Bson::DateTime(_) => 8,
        Bson::Timestamp(_) => 9,
        _ => 10,
    }
}

fn is_ascending(direction: &Bson) -> bool {
    match direction {
        Bson::Int32(n) => *n >= 0,
        Bson::Int64(n) => *n >= 0,
        Bson::Double(n) => *n >= 0.0,
        _ => true,
    }
}

fn order_values(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    let null = Bson::Null;
    let (a, b) = (a.unwrap_or(&null), b.unwrap_or(&null));
    compare(a, b).unwrap_or_else(|| type_rank(a).cmp(&type_rank(b)))
}
