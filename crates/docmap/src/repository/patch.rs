//! Partial updates keyed by read names.

use bson::{Bson, Document};

use crate::error::{PatchError, StorageError};
use crate::schema::{ModelSchema, next_dynamic};

/// A partial update of one record.
///
/// Keys are the model's read names (Rust field names are accepted too).
/// The payload must carry the identity and, for versioned models, the
/// version the caller last read.
///
/// ```
/// use docmap::repository::Patch;
///
/// let patch = Patch::new()
///     .set("id", "6523d1f0a1b2c3d4e5f60718")
///     .set("email", "new@example.com")
///     .set("version", 3);
/// assert_eq!(patch.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    values: Document,
}

/// A patch translated into storage keys.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedPatch {
    /// Filter on identity only.
    pub id_filter: Document,
    /// Filter on identity and, when versioned, the expected version.
    pub filter: Document,
    /// Fields to `$set`, including the next version.
    pub set: Document,
    /// The version written on success.
    pub next_version: Option<Bson>,
}

impl Patch {
    /// Creates an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    /// Wraps a document keyed by read names.
    pub fn from_document(values: Document) -> Self {
        Self { values }
    }

    /// Builds a patch from a JSON object.
    ///
    /// JSON integers become 64-bit values.
    pub fn from_json(value: serde_json::Value) -> Result<Self, PatchError> {
        match value {
            serde_json::Value::Object(_) => match bson::to_bson(&value) {
                Ok(Bson::Document(values)) => Ok(Self { values }),
                Ok(other) => Err(PatchError::NotAnObject {
                    found: format!("{:?}", other.element_type()),
                }),
                Err(e) => Err(PatchError::NotAnObject {
                    found: e.to_string(),
                }),
            },
            other => Err(PatchError::NotAnObject {
                found: json_kind(&other).to_string(),
            }),
        }
    }

    /// Value of a field.
    pub fn get(&self, field: &str) -> Option<&Bson> {
        self.values.get(field)
    }

    /// Number of fields set.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if no field is set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Fields as given, keyed by read names.
    pub fn values(&self) -> &Document {
        &self.values
    }

    /// Resolves names, checks identity and version, and computes the next version.
    pub(crate) fn resolve(&self, schema: &ModelSchema) -> Result<ResolvedPatch, StorageError> {
        let identity = schema.require_identity()?;
        let version = schema.version();

        let mut set = Document::new();
        let mut id = None;
        let mut current_version = None;
        for (name, value) in &self.values {
            let field = schema
                .resolve_json(name)
                .or_else(|| schema.resolve_named(name))
                .ok_or_else(|| PatchError::UndeclaredField {
                    model: schema.model_name().to_string(),
                    field: name.clone(),
                })?;
            if field.index == identity.index {
                id = Some(value.clone());
                continue;
            }
            if version.is_some_and(|(v, _)| v.index == field.index) {
                current_version = Some(value.clone());
                continue;
            }
            set.insert(field.bson.clone(), value.clone());
        }

        let id = id.ok_or_else(|| PatchError::MissingIdentity {
            field: identity.json.clone(),
        })?;
        let mut id_filter = Document::new();
        id_filter.insert(identity.bson.clone(), schema.identity_to_store(id));

        let mut filter = id_filter.clone();
        let next_version = match version {
            None => None,
            Some((field, _)) => {
                let current = current_version.ok_or_else(|| PatchError::MissingVersion {
                    field: field.json.clone(),
                })?;
                let next = next_dynamic(&field.json, &current)?;
                filter.insert(field.bson.clone(), current);
                set.insert(field.bson.clone(), next.clone());
                Some(next)
            }
        };

        Ok(ResolvedPatch {
            id_filter,
            filter,
            set,
            next_version,
        })
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
