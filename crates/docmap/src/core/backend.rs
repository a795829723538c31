//! Backend abstraction for document stores.
//!
//! A [`DocumentStore`] is a connected database; it hands out
//! [`DocumentCollection`] handles that repositories and writers hold for
//! their whole lifetime.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BackendError;

use super::collection::DocumentCollection;

/// Identifies the type of document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// MongoDB.
    MongoDB,
    /// In-process memory store.
    Memory,
    /// Custom or unknown backend.
    Custom(&'static str),
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::MongoDB => write!(f, "mongodb"),
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// A connected document database.
///
/// Collection handles are cheap to create and safe to share between tasks.
///
/// # Example
///
/// ```ignore
/// use docmap::core::DocumentStore;
///
/// let users = store.collection("users");
/// let total = users.count(bson::doc! {}).await?;
/// ```
#[async_trait]
pub trait DocumentStore: Send + Sync + Debug {
    /// Returns the kind of backend.
    fn kind(&self) -> BackendKind;

    /// Returns a human-readable name for this backend.
    fn name(&self) -> &'static str;

    /// Returns a handle on the named collection.
    fn collection(&self, name: &str) -> Arc<dyn DocumentCollection>;

    /// Checks that the backend answers.
    async fn ping(&self) -> Result<(), BackendError>;

    /// Returns the server's version string, or `None` if the backend has none.
    async fn server_version(&self) -> Result<Option<String>, BackendError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_display() {
        assert_eq!(BackendKind::MongoDB.to_string(), "mongodb");
        assert_eq!(BackendKind::Memory.to_string(), "memory");
        assert_eq!(BackendKind::Custom("docdb").to_string(), "docdb");
    }
}
