//! Filter evaluation for the in-memory backend.
//!
//! Covers the query subset the builders in this crate emit: equality,
//! comparisons, `$in`/`$nin`, regular expressions, `$exists` and the
//! `$or`/`$and`/`$nor` combinators. Arrays match when any element matches.

use std::cmp::Ordering;

use bson::{Bson, Document};
use regex::RegexBuilder;

use crate::error::QueryError;

/// Returns `true` if `doc` satisfies `filter`.
pub(crate) fn matches(doc: &Document, filter: &Document) -> Result<bool, QueryError> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$or" => any_clause(doc, condition)?,
            "$and" => all_clauses(doc, condition)?,
            "$nor" => !any_clause(doc, condition)?,
            op if op.starts_with('$') => {
                return Err(QueryError::UnsupportedOperator {
                    operator: op.to_string(),
                });
            }
            path => field_matches(lookup(doc, path), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Resolves a dotted path inside a document.
pub(crate) fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            _ => return None,
        };
    }
    Some(current)
}

fn clauses<'a>(
    condition: &'a Bson,
) -> Result<impl Iterator<Item = Result<&'a Document, QueryError>>, QueryError> {
    let Bson::Array(items) = condition else {
        return Err(QueryError::UnsupportedOperator {
            operator: "logical operator without an array".to_string(),
        });
    };
    Ok(items.iter().map(|item| match item {
        Bson::Document(clause) => Ok(clause),
        _ => Err(QueryError::UnsupportedOperator {
            operator: "non-document logical clause".to_string(),
        }),
    }))
}

fn any_clause(doc: &Document, condition: &Bson) -> Result<bool, QueryError> {
    for clause in clauses(condition)? {
        if matches(doc, clause?)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn all_clauses(doc: &Document, condition: &Bson) -> Result<bool, QueryError> {
    for clause in clauses(condition)? {
        if !matches(doc, clause?)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn is_operator_document(condition: &Bson) -> Option<&Document> {
    match condition {
        Bson::Document(ops) if ops.keys().next().is_some_and(|k| k.starts_with('$')) => Some(ops),
        _ => None,
    }
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> Result<bool, QueryError> {
    if let Some(ops) = is_operator_document(condition) {
        let options = ops.get_str("$options").unwrap_or("");
        for (op, operand) in ops {
            let ok = match op.as_str() {
                "$eq" => equals(value, operand),
                "$ne" => !equals(value, operand),
                "$gt" => compares(value, operand, |o| o == Ordering::Greater),
                "$gte" => compares(value, operand, |o| o != Ordering::Less),
                "$lt" => compares(value, operand, |o| o == Ordering::Less),
                "$lte" => compares(value, operand, |o| o != Ordering::Greater),
                "$in" => in_set(value, operand)?,
                "$nin" => !in_set(value, operand)?,
                "$exists" => value.is_some() == truthy(operand),
                "$regex" => match operand {
                    Bson::String(pattern) => regex_matches(value, pattern, options)?,
                    Bson::RegularExpression(re) => regex_matches(value, &re.pattern, &re.options)?,
                    other => {
                        return Err(QueryError::InvalidPattern {
                            pattern: other.to_string(),
                            message: "expected a string".to_string(),
                        });
                    }
                },
                "$options" => true,
                other => {
                    return Err(QueryError::UnsupportedOperator {
                        operator: other.to_string(),
                    });
                }
            };
            if !ok {
                return Ok(false);
            }
        }
        return Ok(true);
    }

    match condition {
        Bson::RegularExpression(re) => regex_matches(value, &re.pattern, &re.options),
        other => Ok(equals(value, other)),
    }
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::Null => false,
        _ => true,
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

/// Compares two values of the same BSON family.
pub(crate) fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn equals(value: Option<&Bson>, operand: &Bson) -> bool {
    match value {
        None => matches!(operand, Bson::Null),
        Some(Bson::Array(items)) if !matches!(operand, Bson::Array(_)) => {
            items.iter().any(|item| values_equal(item, operand))
        }
        Some(value) => values_equal(value, operand),
    }
}

fn compares(value: Option<&Bson>, operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    match value {
        None => false,
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| compare(item, operand).is_some_and(&accept)),
        Some(value) => compare(value, operand).is_some_and(accept),
    }
}

fn in_set(value: Option<&Bson>, operand: &Bson) -> Result<bool, QueryError> {
    let Bson::Array(candidates) = operand else {
        return Err(QueryError::UnsupportedOperator {
            operator: "$in without an array".to_string(),
        });
    };
    for candidate in candidates {
        let hit = match candidate {
            Bson::RegularExpression(re) => regex_matches(value, &re.pattern, &re.options)?,
            other => equals(value, other),
        };
        if hit {
            return Ok(true);
        }
    }
    Ok(false)
}

fn regex_matches(value: Option<&Bson>, pattern: &str, options: &str) -> Result<bool, QueryError> {
    let re = RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'))
        .build()
        .map_err(|e| QueryError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
    Ok(match value {
        Some(Bson::String(s)) => re.is_match(s),
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| matches!(item, Bson::String(s) if re.is_match(s))),
        _ => false,
    })
}
