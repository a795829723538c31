//! The record trait and record <-> document conversion.

use bson::Document;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{MappingError, SchemaError};
use crate::schema::ModelSchema;

/// A record type stored as one document per value.
///
/// Implemented by `#[derive(Model)]`, which reads `#[model(...)]` and
/// `#[serde(...)]` attributes to produce the schema.
///
/// ```ignore
/// #[derive(Debug, Clone, Serialize, Deserialize, Model)]
/// #[serde(rename_all = "camelCase")]
/// pub struct User {
///     #[serde(rename = "_id")]
///     #[model(id, object_id_hex)]
///     pub id: String,
///     pub user_name: String,
///     #[model(version)]
///     pub version: i32,
/// }
/// ```
pub trait Model: Serialize + DeserializeOwned + Send + Sync + Unpin {
    /// Builds the schema for this type.
    fn schema() -> Result<ModelSchema, SchemaError>;
}

/// Encodes a record into a document.
pub fn to_document<T: Model>(schema: &ModelSchema, model: &T) -> Result<Document, MappingError> {
    bson::to_document(model).map_err(|e| MappingError::Encode {
        model: schema.model_name().to_string(),
        message: e.to_string(),
    })
}

/// Decodes a document into a record.
pub fn from_document<T: Model>(schema: &ModelSchema, doc: Document) -> Result<T, MappingError> {
    bson::from_document(doc).map_err(|e| MappingError::Decode {
        model: schema.model_name().to_string(),
        message: e.to_string(),
    })
}
