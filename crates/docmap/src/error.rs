//! Error types for the data-access layer.
//!
//! Errors are grouped by concern (schema shape, patch payloads, query
//! construction, document mapping and the database backend) and folded into
//! a single [`StorageError`] that every public operation returns.
//!
//! Two write outcomes are not errors: a duplicate key on a
//! single insert and an optimistic version conflict. Both surface as
//! [`WriteOutcome`](crate::types::WriteOutcome) values instead.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// The primary error type for all storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Model schema errors
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Partial update payload errors
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// Query construction and evaluation errors
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Record <-> document conversion errors
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// Backend-specific errors
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl StorageError {
    /// Returns `true` if the backend rejected a write because of a unique key.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StorageError::Backend(BackendError::DuplicateKey { .. }))
    }

    /// Returns the failed input indices of a partially applied bulk write.
    pub fn bulk_failures(&self) -> Option<&[usize]> {
        match self {
            StorageError::Backend(BackendError::BulkWrite { failed, .. }) => Some(failed),
            StorageError::Backend(BackendError::Unmatched { indices, .. }) => Some(indices),
            _ => None,
        }
    }

    /// Returns the indices of bulk operations that succeeded without
    /// matching a document.
    pub fn bulk_unmatched(&self) -> &[usize] {
        match self {
            StorageError::Backend(BackendError::BulkWrite { unmatched, .. }) => unmatched,
            _ => &[],
        }
    }
}

/// Errors raised while building or consulting a model schema.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Two fields resolve to the same storage key.
    #[error("model {model}: storage key '{key}' is declared more than once")]
    DuplicateStorageKey { model: String, key: String },

    /// Two fields resolve to the same read (json) name.
    #[error("model {model}: read name '{name}' is declared more than once")]
    DuplicateReadName { model: String, name: String },

    /// More than one field is marked as the identity.
    #[error("model {model}: both '{first}' and '{second}' are marked as identity")]
    MultipleIdentities {
        model: String,
        first: String,
        second: String,
    },

    /// The identity or version marker names a field that is not declared.
    #[error("model {model}: unknown field '{field}'")]
    UnknownField { model: String, field: String },

    /// The operation needs an identity field and the model has none.
    #[error("model {model} has no identity field")]
    MissingIdentity { model: String },
}

/// Errors raised by map-based partial updates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// The payload does not carry the identity value.
    #[error("patch payload is missing the identity field '{field}'")]
    MissingIdentity { field: String },

    /// The model is versioned and the payload does not carry the version.
    #[error("patch payload is missing the version field '{field}'")]
    MissingVersion { field: String },

    /// The version value is not an integer of a supported width.
    #[error("Do not support this version type: field '{field}' holds {found}")]
    UnsupportedVersionType { field: String, found: String },

    /// The payload names a field the model does not declare.
    #[error("model {model} has no field '{field}'")]
    UndeclaredField { model: String, field: String },

    /// The payload is not a JSON object.
    #[error("patch payload must be an object, got {found}")]
    NotAnObject { found: String },
}

/// Errors related to query construction or evaluation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// A regular expression in a filter could not be compiled.
    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// The filter uses an operator the backend does not evaluate.
    #[error("unsupported query operator: {operator}")]
    UnsupportedOperator { operator: String },

    /// The update document is not an operator document.
    #[error("invalid update document: {message}")]
    InvalidUpdate { message: String },
}

/// Errors converting between records and documents.
#[derive(Error, Debug)]
pub enum MappingError {
    /// A record could not be encoded as a document.
    #[error("failed to encode {model}: {message}")]
    Encode { model: String, message: String },

    /// A document could not be decoded into a record.
    #[error("failed to decode {model}: {message}")]
    Decode { model: String, message: String },

    /// A result mapper rejected a document.
    #[error("mapper failed: {message}")]
    Mapper { message: String },
}

/// Errors originating from the database backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// The backend did not answer within the allotted time.
    #[error("timeout after {timeout_ms}ms waiting for {backend_name}")]
    Timeout { backend_name: String, timeout_ms: u64 },

    /// A unique index rejected the write.
    #[error("duplicate key in {backend_name}: {message}")]
    DuplicateKey {
        backend_name: String,
        message: String,
    },

    /// Some operations of an unordered bulk write failed.
    ///
    /// `unmatched` names the operations that ran without error but matched
    /// no document.
    #[error("bulk write in {backend_name} failed for {} operation(s): {message}", .failed.len())]
    BulkWrite {
        backend_name: String,
        failed: Vec<usize>,
        unmatched: Vec<usize>,
        message: String,
    },

    /// Conditional writes of a bulk request matched no document: the
    /// record is gone or its version moved on.
    #[error("{} operation(s) in {backend_name} matched no document", .indices.len())]
    Unmatched {
        backend_name: String,
        indices: Vec<usize>,
    },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// Implement conversions from common error types

impl From<bson::ser::Error> for MappingError {
    fn from(err: bson::ser::Error) -> Self {
        MappingError::Encode {
            model: "document".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<bson::de::Error> for MappingError {
    fn from(err: bson::de::Error) -> Self {
        MappingError::Decode {
            model: "document".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Backend(BackendError::Internal {
            backend_name: "io".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "mongodb")]
const DUPLICATE_KEY_CODE: i32 = 11000;

#[cfg(feature = "mongodb")]
impl From<mongodb::error::Error> for StorageError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::{ErrorKind, WriteFailure};

        let failed = match err.kind.as_ref() {
            ErrorKind::Write(WriteFailure::WriteError(write_error))
                if write_error.code == DUPLICATE_KEY_CODE =>
            {
                return StorageError::Backend(BackendError::DuplicateKey {
                    backend_name: "mongodb".to_string(),
                    message: write_error.message.clone(),
                });
            }
            ErrorKind::InsertMany(insert_error) => Some(
                insert_error
                    .write_errors
                    .iter()
                    .flatten()
                    .map(|e| e.index)
                    .collect::<Vec<_>>(),
            ),
            ErrorKind::BulkWrite(bulk_error) => {
                let mut indices: Vec<usize> = bulk_error.write_errors.keys().copied().collect();
                indices.sort_unstable();
                Some(indices)
            }
            _ => None,
        };

        match failed {
            // A bulk error without write errors (e.g. a write concern failure)
            // names nobody, so it stays unrecognized.
            Some(failed) if !failed.is_empty() => StorageError::Backend(BackendError::BulkWrite {
                backend_name: "mongodb".to_string(),
                failed,
                unmatched: Vec::new(),
                message: err.to_string(),
            }),
            _ => StorageError::Backend(BackendError::Internal {
                backend_name: "mongodb".to_string(),
                message: err.to_string(),
                source: Some(Box::new(err)),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_display() {
        let err = StorageError::Schema(SchemaError::MissingIdentity {
            model: "User".to_string(),
        });
        assert_eq!(err.to_string(), "model User has no identity field");
    }

    #[test]
    fn test_patch_error_display() {
        let err = PatchError::UnsupportedVersionType {
            field: "version".to_string(),
            found: "string".to_string(),
        };
        assert!(err.to_string().starts_with("Do not support this version type"));
    }

    #[test]
    fn test_bulk_write_display_counts_failures() {
        let err = BackendError::BulkWrite {
            backend_name: "memory".to_string(),
            failed: vec![1, 4],
            unmatched: vec![2],
            message: "E11000".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "bulk write in memory failed for 2 operation(s): E11000"
        );
    }

    #[test]
    fn test_duplicate_key_detection() {
        let err: StorageError = BackendError::DuplicateKey {
            backend_name: "memory".to_string(),
            message: "_id".to_string(),
        }
        .into();
        assert!(err.is_duplicate_key());
        assert!(err.bulk_failures().is_none());

        let err: StorageError = QueryError::UnsupportedOperator {
            operator: "$where".to_string(),
        }
        .into();
        assert!(!err.is_duplicate_key());
    }

    #[test]
    fn test_bulk_failures_accessor() {
        let err: StorageError = BackendError::BulkWrite {
            backend_name: "memory".to_string(),
            failed: vec![2],
            unmatched: vec![0],
            message: String::new(),
        }
        .into();
        assert_eq!(err.bulk_failures(), Some(&[2usize][..]));
        assert_eq!(err.bulk_unmatched(), &[0usize][..]);

        let err: StorageError = BackendError::Unmatched {
            backend_name: "memory".to_string(),
            indices: vec![1, 3],
        }
        .into();
        assert_eq!(err.bulk_failures(), Some(&[1usize, 3][..]));
        assert!(err.bulk_unmatched().is_empty());
        assert_eq!(err.to_string(), "2 operation(s) in memory matched no document");
    }
}
