//! In-process document store.
//!
//! [`MemoryStore`] keeps every collection in a `Vec<Document>` behind a
//! read-write lock and evaluates the query subset this crate emits. It is the
//! backend used by unit and integration tests, and by applications that want
//! the repository API without a running database.
//!
//! # Example
//!
//! ```
//! use docmap::backends::memory::MemoryStore;
//! use docmap::core::{DocumentCollection, DocumentStore};
//!
//! let store = MemoryStore::new().with_unique_index("users", "email");
//! let users = store.collection("users");
//! assert_eq!(users.name(), "users");
//! ```

mod matcher;
mod update;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document};
use futures::StreamExt;
use futures::stream::BoxStream;
use parking_lot::RwLock;
use tracing::{debug, instrument};

use crate::core::{
    BackendKind, DocumentCollection, DocumentStore, FindSpec, UpdateCounts, WriteOp,
    unmatched_indices,
};
use crate::error::{BackendError, QueryError, StorageError, StorageResult};

use self::matcher::{lookup, matches};
use self::update::{apply_update, equality_seed, project, seed_upsert, sort_documents};

const BACKEND_NAME: &str = "memory";
const ID_KEY: &str = "_id";

/// An in-memory [`DocumentStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Arc<MemoryCollection>>>,
    unique_keys: HashMap<String, Vec<String>>,
    ping_delay: Option<Duration>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a unique index on `field` of `collection`.
    ///
    /// `_id` is always unique.
    pub fn with_unique_index(
        mut self,
        collection: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        self.unique_keys
            .entry(collection.into())
            .or_default()
            .push(field.into());
        self
    }

    /// Delays every ping, for exercising health-check timeouts.
    pub fn with_ping_delay(mut self, delay: Duration) -> Self {
        self.ping_delay = Some(delay);
        self
    }

    /// Returns the concrete collection handle.
    pub fn memory_collection(&self, name: &str) -> Arc<MemoryCollection> {
        if let Some(existing) = self.collections.read().get(name) {
            return Arc::clone(existing);
        }
        let mut collections = self.collections.write();
        let unique = self.unique_keys.get(name).cloned().unwrap_or_default();
        Arc::clone(
            collections
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(MemoryCollection::new(name, unique))),
        )
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn collection(&self, name: &str) -> Arc<dyn DocumentCollection> {
        self.memory_collection(name)
    }

    async fn ping(&self) -> Result<(), BackendError> {
        if let Some(delay) = self.ping_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn server_version(&self) -> Result<Option<String>, BackendError> {
        self.ping().await?;
        Ok(Some(format!("memory-{}", crate::VERSION)))
    }
}

/// One in-memory collection.
#[derive(Debug)]
pub struct MemoryCollection {
    name: String,
    unique_keys: Vec<String>,
    documents: RwLock<Vec<Document>>,
}

impl MemoryCollection {
    fn new(name: &str, unique_keys: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            unique_keys,
            documents: RwLock::new(Vec::new()),
        }
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Returns `true` if the collection holds no documents.
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    /// Copies of every stored document, in insertion order.
    pub fn snapshot(&self) -> Vec<Document> {
        self.documents.read().clone()
    }

    fn select(&self, filter: &Document, spec: &FindSpec) -> Result<Vec<Document>, QueryError> {
        let docs = self.documents.read();
        let mut selected = Vec::new();
        for doc in docs.iter() {
            if matches(doc, filter)? {
                selected.push(doc.clone());
            }
        }
        drop(docs);

        if let Some(sort) = &spec.sort {
            sort_documents(&mut selected, sort);
        }
        let skip = usize::try_from(spec.skip.unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = match spec.limit {
            Some(n) if n != 0 => usize::try_from(n.unsigned_abs()).unwrap_or(usize::MAX),
            _ => usize::MAX,
        };
        Ok(selected
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|doc| match &spec.projection {
                Some(projection) => project(doc, projection),
                None => doc,
            })
            .collect())
    }

    fn duplicate(&self, key: &str, value: &Bson) -> BackendError {
        BackendError::DuplicateKey {
            backend_name: BACKEND_NAME.to_string(),
            message: format!(
                "E11000 duplicate key error collection: {} index: {}_1 dup key: {{ {}: {} }}",
                self.name, key, key, value
            ),
        }
    }

    fn check_unique(
        &self,
        docs: &[Document],
        candidate: &Document,
        skip: Option<usize>,
    ) -> Result<(), BackendError> {
        let keys = std::iter::once(ID_KEY).chain(self.unique_keys.iter().map(String::as_str));
        for key in keys {
            let Some(value) = lookup(candidate, key) else {
                continue;
            };
            if matches!(value, Bson::Null) && key != ID_KEY {
                continue;
            }
            let clash = docs
                .iter()
                .enumerate()
                .filter(|(i, _)| Some(*i) != skip)
                .any(|(_, doc)| lookup(doc, key) == Some(value));
            if clash {
                return Err(self.duplicate(key, value));
            }
        }
        Ok(())
    }

    fn insert_locked(&self, docs: &mut Vec<Document>, mut doc: Document) -> StorageResult<Bson> {
        let id = match doc.get(ID_KEY) {
            Some(id) if !matches!(id, Bson::Null) => id.clone(),
            _ => {
                let id = Bson::ObjectId(ObjectId::new());
                doc.insert(ID_KEY, id.clone());
                id
            }
        };
        self.check_unique(docs, &doc, None)?;
        docs.push(doc);
        Ok(id)
    }

    fn position(docs: &[Document], filter: &Document) -> Result<Option<usize>, QueryError> {
        for (i, doc) in docs.iter().enumerate() {
            if matches(doc, filter)? {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    fn store_at(&self, docs: &mut [Document], index: usize, updated: Document) -> StorageResult<u64> {
        if updated.get(ID_KEY) != docs[index].get(ID_KEY) {
            return Err(QueryError::InvalidUpdate {
                message: "the _id field is immutable".to_string(),
            }
            .into());
        }
        self.check_unique(docs, &updated, Some(index))?;
        let modified = u64::from(docs[index] != updated);
        docs[index] = updated;
        Ok(modified)
    }

    fn update_locked(
        &self,
        docs: &mut Vec<Document>,
        filter: &Document,
        update: &Document,
        upsert: bool,
    ) -> StorageResult<UpdateCounts> {
        match Self::position(docs, filter)? {
            Some(index) => {
                let mut updated = docs[index].clone();
                apply_update(&mut updated, update)?;
                let modified = self.store_at(docs, index, updated)?;
                Ok(UpdateCounts {
                    matched: 1,
                    modified,
                    upserted_id: None,
                })
            }
            None if upsert => {
                let seeded = seed_upsert(filter, update)?;
                let id = self.insert_locked(docs, seeded)?;
                Ok(UpdateCounts {
                    upserted_id: Some(id),
                    ..Default::default()
                })
            }
            None => Ok(UpdateCounts::default()),
        }
    }

    fn replace_locked(
        &self,
        docs: &mut Vec<Document>,
        filter: &Document,
        replacement: &Document,
        upsert: bool,
    ) -> StorageResult<UpdateCounts> {
        if replacement.keys().any(|k| k.starts_with('$')) {
            return Err(QueryError::InvalidUpdate {
                message: "replacement document must not contain operators".to_string(),
            }
            .into());
        }
        match Self::position(docs, filter)? {
            Some(index) => {
                let mut updated = replacement.clone();
                if !updated.contains_key(ID_KEY) {
                    if let Some(id) = docs[index].get(ID_KEY) {
                        updated.insert(ID_KEY, id.clone());
                    }
                }
                let modified = self.store_at(docs, index, updated)?;
                Ok(UpdateCounts {
                    matched: 1,
                    modified,
                    upserted_id: None,
                })
            }
            None if upsert => {
                let mut seeded = replacement.clone();
                if !seeded.contains_key(ID_KEY) {
                    if let Some(id) = equality_seed(filter).get(ID_KEY) {
                        seeded.insert(ID_KEY, id.clone());
                    }
                }
                let id = self.insert_locked(docs, seeded)?;
                Ok(UpdateCounts {
                    upserted_id: Some(id),
                    ..Default::default()
                })
            }
            None => Ok(UpdateCounts::default()),
        }
    }

    fn delete_locked(docs: &mut Vec<Document>, filter: &Document) -> StorageResult<u64> {
        match Self::position(docs, filter)? {
            Some(index) => {
                docs.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn bulk_failure(
        &self,
        failed: Vec<usize>,
        unmatched: Vec<usize>,
        first: StorageError,
    ) -> StorageError {
        BackendError::BulkWrite {
            backend_name: BACKEND_NAME.to_string(),
            failed,
            unmatched,
            message: first.to_string(),
        }
        .into()
    }
}

#[async_trait]
impl DocumentCollection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    #[instrument(skip(self, spec), fields(collection = %self.name))]
    async fn find(&self, filter: Document, spec: FindSpec) -> StorageResult<Vec<Document>> {
        Ok(self.select(&filter, &spec)?)
    }

    async fn find_stream(
        &self,
        filter: Document,
        spec: FindSpec,
    ) -> StorageResult<BoxStream<'static, StorageResult<Document>>> {
        let docs = self.select(&filter, &spec)?;
        Ok(futures::stream::iter(docs.into_iter().map(Ok)).boxed())
    }

    async fn find_one(&self, filter: Document) -> StorageResult<Option<Document>> {
        let docs = self.documents.read();
        let index = Self::position(&docs, &filter)?;
        Ok(index.map(|i| docs[i].clone()))
    }

    async fn count(&self, filter: Document) -> StorageResult<u64> {
        let docs = self.documents.read();
        let mut total = 0u64;
        for doc in docs.iter() {
            if matches(doc, &filter)? {
                total += 1;
            }
        }
        Ok(total)
    }

    async fn insert_one(&self, doc: Document) -> StorageResult<Bson> {
        let mut docs = self.documents.write();
        self.insert_locked(&mut docs, doc)
    }

    async fn insert_many(&self, batch: Vec<Document>) -> StorageResult<Vec<Bson>> {
        let mut docs = self.documents.write();
        let mut ids = Vec::with_capacity(batch.len());
        let mut failed = Vec::new();
        let mut first_error = None;
        for (index, doc) in batch.into_iter().enumerate() {
            match self.insert_locked(&mut docs, doc) {
                Ok(id) => ids.push(id),
                Err(err) => {
                    failed.push(index);
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => {
                debug!(collection = %self.name, failed = failed.len(), "insert_many partially failed");
                Err(self.bulk_failure(failed, Vec::new(), err))
            }
            None => Ok(ids),
        }
    }

    async fn update_one(
        &self,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> StorageResult<UpdateCounts> {
        let mut docs = self.documents.write();
        self.update_locked(&mut docs, &filter, &update, upsert)
    }

    async fn replace_one(
        &self,
        filter: Document,
        replacement: Document,
        upsert: bool,
    ) -> StorageResult<UpdateCounts> {
        let mut docs = self.documents.write();
        self.replace_locked(&mut docs, &filter, &replacement, upsert)
    }

    async fn delete_one(&self, filter: Document) -> StorageResult<u64> {
        let mut docs = self.documents.write();
        Self::delete_locked(&mut docs, &filter)
    }

    async fn bulk_write(&self, ops: Vec<WriteOp>) -> StorageResult<Vec<u64>> {
        let mut docs = self.documents.write();
        let mut counts = Vec::with_capacity(ops.len());
        let mut failed = Vec::new();
        let mut first_error = None;
        for (index, op) in ops.into_iter().enumerate() {
            let result = match op {
                WriteOp::InsertOne(doc) => self.insert_locked(&mut docs, doc).map(|_| 1),
                WriteOp::UpdateOne {
                    filter,
                    update,
                    upsert,
                } => self
                    .update_locked(&mut docs, &filter, &update, upsert)
                    .map(|counts| counts.rows()),
                WriteOp::ReplaceOne {
                    filter,
                    replacement,
                    upsert,
                } => self
                    .replace_locked(&mut docs, &filter, &replacement, upsert)
                    .map(|counts| counts.rows()),
                WriteOp::DeleteOne { filter } => Self::delete_locked(&mut docs, &filter),
            };
            match result {
                Ok(n) => counts.push(n),
                Err(err) => {
                    counts.push(0);
                    failed.push(index);
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => {
                debug!(collection = %self.name, failed = failed.len(), "bulk_write partially failed");
                let unmatched = unmatched_indices(&counts, &failed);
                Err(self.bulk_failure(failed, unmatched, err))
            }
            None => Ok(counts),
        }
    }
}
