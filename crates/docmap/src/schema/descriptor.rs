//! Field descriptors and the per-model schema table.

use std::collections::HashSet;

use bson::Bson;
use bson::oid::ObjectId;

use crate::error::SchemaError;

use super::version::VersionWidth;

/// One declared field of a model.
///
/// `json` is the external read name (what callers use in field allowlists,
/// sort specs and patches), `bson` is the storage key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Declaration position of the field in the record type.
    pub index: usize,
    /// Rust field name.
    pub name: String,
    /// External read name.
    pub json: String,
    /// Storage key.
    pub bson: String,
}

impl FieldDescriptor {
    /// Creates a descriptor.
    pub fn new(
        index: usize,
        name: impl Into<String>,
        json: impl Into<String>,
        bson: impl Into<String>,
    ) -> Self {
        Self {
            index,
            name: name.into(),
            json: json.into(),
            bson: bson.into(),
        }
    }
}

/// How identity values are represented in the record versus the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityKind {
    /// Stored exactly as the record serializes it.
    #[default]
    Native,
    /// A hex string in the record, an ObjectId in the store.
    ObjectIdHex,
}

/// Resolved field table for one model type.
///
/// Built once (normally by `#[derive(Model)]`) and read-only afterwards.
#[derive(Debug, Clone)]
pub struct ModelSchema {
    model: String,
    fields: Vec<FieldDescriptor>,
    identity: Option<usize>,
    identity_kind: IdentityKind,
    version: Option<(usize, VersionWidth)>,
}

impl ModelSchema {
    /// Starts a schema for the named model.
    pub fn builder(model: impl Into<String>) -> ModelSchemaBuilder {
        ModelSchemaBuilder {
            model: model.into(),
            fields: Vec::new(),
            identities: Vec::new(),
            identity_kind: IdentityKind::Native,
            version: None,
        }
    }

    /// Model type name, used in errors and logs.
    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// All declared fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// The identity field, if the model has one.
    pub fn resolve_identity(&self) -> Option<&FieldDescriptor> {
        self.identity.map(|i| &self.fields[i])
    }

    /// The identity field, or [`SchemaError::MissingIdentity`].
    pub fn require_identity(&self) -> Result<&FieldDescriptor, SchemaError> {
        self.resolve_identity()
            .ok_or_else(|| SchemaError::MissingIdentity {
                model: self.model.clone(),
            })
    }

    /// Storage key of the identity, falling back to `_id`.
    pub fn identity_key(&self) -> &str {
        self.resolve_identity().map_or("_id", |f| f.bson.as_str())
    }

    /// How the identity is represented.
    pub fn identity_kind(&self) -> IdentityKind {
        self.identity_kind
    }

    /// The optimistic-concurrency version field and its width.
    pub fn version(&self) -> Option<(&FieldDescriptor, VersionWidth)> {
        self.version.map(|(i, width)| (&self.fields[i], width))
    }

    /// Finds a field by its Rust name.
    pub fn resolve_named(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Finds a field by its read name.
    pub fn resolve_json(&self, json: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.json == json)
    }

    /// Finds a field by its storage key.
    pub fn resolve_bson(&self, bson: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.bson == bson)
    }

    /// Resolves a caller-facing name (read name, then Rust name) to a storage key.
    pub fn storage_key(&self, name: &str) -> Option<&str> {
        self.resolve_json(name)
            .or_else(|| self.resolve_named(name))
            .map(|f| f.bson.as_str())
    }

    /// Converts a record-side identity value into its stored form.
    pub fn identity_to_store(&self, value: Bson) -> Bson {
        match (self.identity_kind, value) {
            (IdentityKind::ObjectIdHex, Bson::String(hex)) => match ObjectId::parse_str(&hex) {
                Ok(oid) => Bson::ObjectId(oid),
                Err(_) => Bson::String(hex),
            },
            (_, value) => value,
        }
    }

    /// Converts a stored identity value into its record-side form.
    pub fn identity_to_model(&self, value: Bson) -> Bson {
        match (self.identity_kind, value) {
            (IdentityKind::ObjectIdHex, Bson::ObjectId(oid)) => Bson::String(oid.to_hex()),
            (_, value) => value,
        }
    }
}

/// Returns `true` for identity values that mean "not assigned yet".
pub fn is_empty_identity(value: Option<&Bson>) -> bool {
    match value {
        None | Some(Bson::Null) | Some(Bson::Undefined) => true,
        Some(Bson::String(s)) => s.is_empty(),
        Some(Bson::Int32(0)) | Some(Bson::Int64(0)) => true,
        Some(_) => false,
    }
}

/// Builder for [`ModelSchema`].
#[derive(Debug)]
pub struct ModelSchemaBuilder {
    model: String,
    fields: Vec<FieldDescriptor>,
    identities: Vec<String>,
    identity_kind: IdentityKind,
    version: Option<(String, VersionWidth)>,
}

impl ModelSchemaBuilder {
    /// Declares a field. Fields whose read or storage name is `-` are ignored.
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        if field.json != "-" && field.bson != "-" {
            self.fields.push(field);
        }
        self
    }

    /// Marks the named field as the identity.
    pub fn identity(mut self, name: impl Into<String>, kind: IdentityKind) -> Self {
        self.identities.push(name.into());
        self.identity_kind = kind;
        self
    }

    /// Marks the named field as the version counter.
    pub fn version(mut self, name: impl Into<String>, width: VersionWidth) -> Self {
        self.version = Some((name.into(), width));
        self
    }

    /// Validates the declarations and builds the schema.
    pub fn build(self) -> Result<ModelSchema, SchemaError> {
        let mut keys = HashSet::new();
        let mut names = HashSet::new();
        for field in &self.fields {
            if !keys.insert(field.bson.as_str()) {
                return Err(SchemaError::DuplicateStorageKey {
                    model: self.model.clone(),
                    key: field.bson.clone(),
                });
            }
            if !names.insert(field.json.as_str()) {
                return Err(SchemaError::DuplicateReadName {
                    model: self.model.clone(),
                    name: field.json.clone(),
                });
            }
        }

        let position = |name: &str| {
            self.fields
                .iter()
                .position(|f| f.name == name)
                .ok_or_else(|| SchemaError::UnknownField {
                    model: self.model.clone(),
                    field: name.to_string(),
                })
        };

        let identity = match self.identities.as_slice() {
            [] => {
                tracing::warn!(
                    model = %self.model,
                    "model has no identity field; only read operations are available"
                );
                None
            }
            [name] => Some(position(name)?),
            [first, second, ..] => {
                return Err(SchemaError::MultipleIdentities {
                    model: self.model.clone(),
                    first: first.clone(),
                    second: second.clone(),
                });
            }
        };

        let version = match &self.version {
            Some((name, width)) => Some((position(name)?, *width)),
            None => None,
        };

        Ok(ModelSchema {
            model: self.model,
            fields: self.fields,
            identity,
            identity_kind: self.identity_kind,
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_schema() -> ModelSchema {
        ModelSchema::builder("User")
            .field(FieldDescriptor::new(0, "id", "id", "_id"))
            .field(FieldDescriptor::new(1, "user_name", "userName", "username"))
            .field(FieldDescriptor::new(2, "version", "version", "version"))
            .identity("id", IdentityKind::ObjectIdHex)
            .version("version", VersionWidth::I32)
            .build()
            .unwrap()
    }

    #[test]
    fn test_resolve_identity_and_named_fields() {
        let schema = user_schema();
        let id = schema.resolve_identity().unwrap();
        assert_eq!((id.index, id.json.as_str(), id.bson.as_str()), (0, "id", "_id"));

        let field = schema.resolve_named("user_name").unwrap();
        assert_eq!(field.index, 1);
        assert_eq!(field.json, "userName");
        assert_eq!(field.bson, "username");

        assert!(schema.resolve_named("missing").is_none());
        assert_eq!(schema.storage_key("userName"), Some("username"));
        assert_eq!(schema.storage_key("user_name"), Some("username"));
        assert_eq!(schema.storage_key("nope"), None);
    }

    #[test]
    fn test_missing_identity_is_not_fatal() {
        let schema = ModelSchema::builder("Audit")
            .field(FieldDescriptor::new(0, "action", "action", "action"))
            .build()
            .unwrap();
        assert!(schema.resolve_identity().is_none());
        assert_eq!(schema.identity_key(), "_id");
        assert!(matches!(
            schema.require_identity(),
            Err(SchemaError::MissingIdentity { .. })
        ));
    }

    #[test]
    fn test_duplicate_storage_key_rejected() {
        let result = ModelSchema::builder("Broken")
            .field(FieldDescriptor::new(0, "a", "a", "same"))
            .field(FieldDescriptor::new(1, "b", "b", "same"))
            .build();
        assert!(matches!(
            result,
            Err(SchemaError::DuplicateStorageKey { key, .. }) if key == "same"
        ));
    }

    #[test]
    fn test_multiple_identities_rejected() {
        let result = ModelSchema::builder("Broken")
            .field(FieldDescriptor::new(0, "a", "a", "a"))
            .field(FieldDescriptor::new(1, "b", "b", "b"))
            .identity("a", IdentityKind::Native)
            .identity("b", IdentityKind::Native)
            .build();
        assert!(matches!(result, Err(SchemaError::MultipleIdentities { .. })));
    }

    #[test]
    fn test_unknown_version_field_rejected() {
        let result = ModelSchema::builder("Broken")
            .field(FieldDescriptor::new(0, "id", "id", "_id"))
            .identity("id", IdentityKind::Native)
            .version("rev", VersionWidth::I64)
            .build();
        assert_eq!(
            result.unwrap_err(),
            SchemaError::UnknownField {
                model: "Broken".to_string(),
                field: "rev".to_string()
            }
        );
    }

    #[test]
    fn test_dash_fields_are_ignored() {
        let schema = ModelSchema::builder("User")
            .field(FieldDescriptor::new(0, "id", "id", "_id"))
            .field(FieldDescriptor::new(1, "secret", "secret", "-"))
            .build()
            .unwrap();
        assert_eq!(schema.fields().len(), 1);
        assert!(schema.resolve_named("secret").is_none());
    }

    #[test]
    fn test_object_id_hex_conversion() {
        let schema = user_schema();
        let oid = ObjectId::new();
        let stored = schema.identity_to_store(Bson::String(oid.to_hex()));
        assert_eq!(stored, Bson::ObjectId(oid));
        assert_eq!(schema.identity_to_model(stored), Bson::String(oid.to_hex()));

        // Non-hex identities pass through untouched.
        let stored = schema.identity_to_store(Bson::String("user-1".to_string()));
        assert_eq!(stored, Bson::String("user-1".to_string()));
    }

    #[test]
    fn test_empty_identity_values() {
        assert!(is_empty_identity(None));
        assert!(is_empty_identity(Some(&Bson::Null)));
        assert!(is_empty_identity(Some(&Bson::String(String::new()))));
        assert!(is_empty_identity(Some(&Bson::Int64(0))));
        assert!(!is_empty_identity(Some(&Bson::String("a".to_string()))));
        assert!(!is_empty_identity(Some(&Bson::Int32(7))));
    }
}
