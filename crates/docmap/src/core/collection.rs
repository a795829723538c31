//! Collection-level operations every backend provides.

use std::fmt::Debug;

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::stream::BoxStream;

use crate::error::StorageResult;

/// Options for a find.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindSpec {
    /// Inclusion projection.
    pub projection: Option<Document>,
    /// Ordered sort document.
    pub sort: Option<Document>,
    /// Documents to skip.
    pub skip: Option<u64>,
    /// Maximum documents to return.
    pub limit: Option<i64>,
}

impl FindSpec {
    /// Sets the projection.
    pub fn with_projection(mut self, projection: Option<Document>) -> Self {
        self.projection = projection;
        self
    }

    /// Sets the sort document.
    pub fn with_sort(mut self, sort: Option<Document>) -> Self {
        self.sort = sort;
        self
    }

    /// Sets skip and limit.
    pub fn with_window(mut self, skip: u64, limit: i64) -> Self {
        self.skip = Some(skip);
        self.limit = Some(limit);
        self
    }
}

/// Counts reported by an update or replace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateCounts {
    /// Documents matched by the filter.
    pub matched: u64,
    /// Documents actually changed.
    pub modified: u64,
    /// Identity of the inserted document when an upsert inserted.
    pub upserted_id: Option<Bson>,
}

impl UpdateCounts {
    /// Modified count, else 1 for an upsert, else the matched count.
    pub fn rows(&self) -> u64 {
        if self.modified > 0 {
            self.modified
        } else if self.upserted_id.is_some() {
            1
        } else {
            self.matched
        }
    }
}

/// One operation of a bulk write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Insert a document.
    InsertOne(Document),
    /// Apply an update document to the first match.
    UpdateOne {
        /// Selects the document.
        filter: Document,
        /// Operator document (`$set`, ...).
        update: Document,
        /// Insert when nothing matches.
        upsert: bool,
    },
    /// Replace the first match.
    ReplaceOne {
        /// Selects the document.
        filter: Document,
        /// The new document.
        replacement: Document,
        /// Insert when nothing matches.
        upsert: bool,
    },
    /// Delete the first match.
    DeleteOne {
        /// Selects the document.
        filter: Document,
    },
}

/// Indices of operations that ran without error yet matched nothing.
pub(crate) fn unmatched_indices(counts: &[u64], failed: &[usize]) -> Vec<usize> {
    counts
        .iter()
        .enumerate()
        .filter(|(index, count)| **count == 0 && !failed.contains(index))
        .map(|(index, _)| index)
        .collect()
}

/// A handle on one collection.
///
/// Bulk operations (`insert_many`, `bulk_write`) are unordered: every
/// operation is attempted, and a partial failure is reported as
/// [`BackendError::BulkWrite`](crate::error::BackendError::BulkWrite) naming
/// the failed 0-based indices.
#[async_trait]
pub trait DocumentCollection: Send + Sync + Debug {
    /// Collection name.
    fn name(&self) -> &str;

    /// Name of the backend serving this collection.
    fn backend_name(&self) -> &'static str;

    /// Returns all documents matching `filter`.
    async fn find(&self, filter: Document, spec: FindSpec) -> StorageResult<Vec<Document>>;

    /// Streams documents matching `filter`.
    async fn find_stream(
        &self,
        filter: Document,
        spec: FindSpec,
    ) -> StorageResult<BoxStream<'static, StorageResult<Document>>>;

    /// Returns the first document matching `filter`.
    async fn find_one(&self, filter: Document) -> StorageResult<Option<Document>>;

    /// Counts documents matching `filter`.
    async fn count(&self, filter: Document) -> StorageResult<u64>;

    /// Inserts a document and returns its identity.
    async fn insert_one(&self, doc: Document) -> StorageResult<Bson>;

    /// Inserts documents, unordered; returns identities by input position.
    async fn insert_many(&self, docs: Vec<Document>) -> StorageResult<Vec<Bson>>;

    /// Applies an operator update to the first match.
    async fn update_one(
        &self,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> StorageResult<UpdateCounts>;

    /// Replaces the first match.
    async fn replace_one(
        &self,
        filter: Document,
        replacement: Document,
        upsert: bool,
    ) -> StorageResult<UpdateCounts>;

    /// Deletes the first match; returns the deleted count.
    async fn delete_one(&self, filter: Document) -> StorageResult<u64>;

    /// Runs independent operations as one unordered bulk request.
    ///
    /// Returns one count per operation, in input order: 1 for an insert,
    /// matched or upserted documents for an update or replace, deleted
    /// documents for a delete. A count of 0 means the operation matched
    /// nothing. On partial failure the
    /// [`BulkWrite`](crate::error::BackendError::BulkWrite) error lists
    /// those operations in `unmatched`.
    async fn bulk_write(&self, ops: Vec<WriteOp>) -> StorageResult<Vec<u64>>;
}
