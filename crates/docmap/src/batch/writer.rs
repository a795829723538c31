//! Bulk writes of many records in one request.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use tracing::{debug, warn};

use crate::core::{DocumentCollection, DocumentStore, WriteOp, unmatched_indices};
use crate::error::{BackendError, StorageResult};
use crate::mapper::Mapper;
use crate::model::{Model, from_document, to_document};
use crate::repository::{Patch, Repository, back_fill, to_store};
use crate::schema::{ModelSchema, is_empty_identity};
use crate::types::BulkOutcome;

/// What a batch reports when the backend error names no failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Every record of the batch is reported failed.
    #[default]
    AssumeAllFailed,
    /// Only failures the backend named are reported; any other error is
    /// returned as `Err`.
    ReportNamedOnly,
}

/// Writes slices of records as single unordered bulk requests.
///
/// Every method returns a [`BulkOutcome`] partitioning the input indices.
/// A backend error that names failed operations is turned into that
/// partition; anything else is handled by the [`FailurePolicy`]. An update
/// or patch that matched no document (stale version or missing record) is
/// reported failed with a [`BackendError::Unmatched`] cause.
///
/// Operations of one batch are unordered: two records with the same
/// identity in one batch may be applied in either order.
pub struct BatchWriter<T: Model> {
    collection: Arc<dyn DocumentCollection>,
    schema: Arc<ModelSchema>,
    mapper: Option<Arc<dyn Mapper>>,
    policy: FailurePolicy,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Model> fmt::Debug for BatchWriter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchWriter")
            .field("model", &self.schema.model_name())
            .field("collection", &self.collection.name())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<T: Model> BatchWriter<T> {
    /// Creates a writer over the named collection of `store`.
    pub fn new(store: &dyn DocumentStore, collection: &str) -> StorageResult<Self> {
        Self::with_collection(store.collection(collection))
    }

    /// Creates a writer over an existing collection handle.
    pub fn with_collection(collection: Arc<dyn DocumentCollection>) -> StorageResult<Self> {
        let schema = T::schema()?;
        schema.require_identity()?;
        Ok(Self {
            collection,
            schema: Arc::new(schema),
            mapper: None,
            policy: FailurePolicy::default(),
            _marker: PhantomData,
        })
    }

    /// Creates a writer sharing a repository's collection, schema and mapper.
    pub fn from_repository(repository: &Repository<T>) -> StorageResult<Self> {
        let schema = repository.shared_schema();
        schema.require_identity()?;
        Ok(Self {
            collection: Arc::clone(repository.collection()),
            schema,
            mapper: repository.shared_mapper(),
            policy: FailurePolicy::default(),
            _marker: PhantomData,
        })
    }

    /// Sets the failure policy.
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Applies `mapper` to every document written.
    pub fn with_mapper(mut self, mapper: impl Mapper + 'static) -> Self {
        self.mapper = Some(Arc::new(mapper));
        self
    }

    /// The failure policy in effect.
    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    fn store_form(&self, doc: Document) -> StorageResult<Document> {
        to_store(&self.schema, self.mapper.as_deref(), doc)
    }

    /// Gives an empty identity a fresh ObjectId so the record can be
    /// written back whatever happens to the batch.
    fn assign_identity(&self, doc: &mut Document) {
        let key = self.schema.identity_key().to_string();
        let original = doc.get(&key).cloned();
        if is_empty_identity(original.as_ref()) {
            let assigned = Bson::ObjectId(ObjectId::new());
            doc.insert(key, back_fill(&self.schema, original.as_ref(), assigned));
        }
    }

    fn id_filter(&self, doc: &Document) -> Document {
        let key = self.schema.identity_key();
        let id = doc.get(key).cloned().unwrap_or(Bson::Null);
        let mut filter = Document::new();
        filter.insert(key, self.schema.identity_to_store(id));
        filter
    }

    fn set_document(&self, doc: Document) -> StorageResult<Document> {
        let mut stored = self.store_form(doc)?;
        stored.remove(self.schema.identity_key());
        Ok(stored)
    }

    /// Inserts every record.
    ///
    /// Versioned records are stamped with version 1 and empty identities
    /// receive a new ObjectId. Records reported as succeeded are updated in
    /// place.
    pub async fn insert_many(&self, models: &mut [T]) -> StorageResult<BulkOutcome> {
        let mut docs = Vec::with_capacity(models.len());
        for model in models.iter() {
            let mut doc = to_document(&self.schema, model)?;
            if let Some((field, width)) = self.schema.version() {
                doc.insert(field.bson.clone(), width.initial());
            }
            self.assign_identity(&mut doc);
            docs.push(doc);
        }

        let ops = docs
            .iter()
            .map(|doc| self.store_form(doc.clone()).map(WriteOp::InsertOne))
            .collect::<StorageResult<Vec<_>>>()?;
        let outcome = self.submit(ops).await?;
        self.write_back(models, docs, &outcome)?;
        Ok(outcome)
    }

    /// Updates every record by identity.
    ///
    /// Versioned records are filtered on the version they carry and written
    /// with the next one. Records reported as succeeded are advanced in
    /// place; a record whose version is stale, or that no longer exists,
    /// is reported failed and left untouched.
    pub async fn update_many(&self, models: &mut [T]) -> StorageResult<BulkOutcome> {
        let mut docs = Vec::with_capacity(models.len());
        let mut ops = Vec::with_capacity(models.len());
        for model in models.iter() {
            let mut doc = to_document(&self.schema, model)?;
            let mut filter = self.id_filter(&doc);
            if let Some((field, width)) = self.schema.version() {
                let current = doc.get(&field.bson).cloned().unwrap_or(Bson::Null);
                let next = width.next(&field.json, &current)?;
                filter.insert(field.bson.clone(), current);
                doc.insert(field.bson.clone(), next);
            }
            let set = self.set_document(doc.clone())?;
            ops.push(WriteOp::UpdateOne {
                filter,
                update: doc! { "$set": set },
                upsert: false,
            });
            docs.push(doc);
        }
        let outcome = self.submit(ops).await?;
        self.write_back(models, docs, &outcome)?;
        Ok(outcome)
    }

    /// Replaces records that carry an identity (inserting them if absent)
    /// and inserts the others with a new ObjectId.
    pub async fn upsert_many(&self, models: &mut [T]) -> StorageResult<BulkOutcome> {
        let mut docs = Vec::with_capacity(models.len());
        let mut ops = Vec::with_capacity(models.len());
        for model in models.iter() {
            let mut doc = to_document(&self.schema, model)?;
            let has_identity = !is_empty_identity(doc.get(self.schema.identity_key()));
            let op = if has_identity {
                WriteOp::ReplaceOne {
                    filter: self.id_filter(&doc),
                    replacement: self.store_form(doc.clone())?,
                    upsert: true,
                }
            } else {
                if let Some((field, width)) = self.schema.version() {
                    doc.insert(field.bson.clone(), width.initial());
                }
                self.assign_identity(&mut doc);
                WriteOp::InsertOne(self.store_form(doc.clone())?)
            };
            docs.push(doc);
            ops.push(op);
        }
        let outcome = self.submit(ops).await?;
        self.write_back(models, docs, &outcome)?;
        Ok(outcome)
    }

    /// Applies every patch.
    ///
    /// All patches are validated before anything is sent; an invalid patch
    /// fails the call without writing. A patch whose version is stale, or
    /// whose record is gone, is reported failed.
    pub async fn patch_many(&self, patches: &[Patch]) -> StorageResult<BulkOutcome> {
        let mut ops = Vec::with_capacity(patches.len());
        for patch in patches {
            let resolved = patch.resolve(&self.schema)?;
            let set = match self.mapper.as_deref() {
                Some(mapper) => mapper.to_store(resolved.set)?,
                None => resolved.set,
            };
            ops.push(WriteOp::UpdateOne {
                filter: resolved.filter,
                update: doc! { "$set": set },
                upsert: false,
            });
        }
        self.submit(ops).await
    }

    async fn submit(&self, ops: Vec<WriteOp>) -> StorageResult<BulkOutcome> {
        let len = ops.len();
        if len == 0 {
            return Ok(BulkOutcome::all_succeeded(0));
        }
        match self.collection.bulk_write(ops).await {
            Ok(counts) => {
                let unmatched = unmatched_indices(&counts, &[]);
                if unmatched.is_empty() {
                    debug!(
                        collection = %self.collection.name(),
                        records = len,
                        "bulk write completed"
                    );
                    return Ok(BulkOutcome::all_succeeded(len));
                }
                warn!(
                    collection = %self.collection.name(),
                    records = len,
                    unmatched = unmatched.len(),
                    "bulk write matched no document for some records"
                );
                let cause = BackendError::Unmatched {
                    backend_name: self.collection.backend_name().to_string(),
                    indices: unmatched.clone(),
                };
                Ok(BulkOutcome::partition(len, &unmatched, cause.into()))
            }
            Err(err) => {
                if let Some(named) = err.bulk_failures() {
                    let mut failed = named.to_vec();
                    failed.extend_from_slice(err.bulk_unmatched());
                    warn!(
                        collection = %self.collection.name(),
                        records = len,
                        failed = failed.len(),
                        "bulk write partially failed"
                    );
                    return Ok(BulkOutcome::partition(len, &failed, err));
                }
                match self.policy {
                    FailurePolicy::AssumeAllFailed => {
                        warn!(
                            collection = %self.collection.name(),
                            records = len,
                            error = %err,
                            "bulk write failed; reporting every record as failed"
                        );
                        Ok(BulkOutcome::all_failed(len, err))
                    }
                    FailurePolicy::ReportNamedOnly => Err(err),
                }
            }
        }
    }

    fn write_back(
        &self,
        models: &mut [T],
        docs: Vec<Document>,
        outcome: &BulkOutcome,
    ) -> StorageResult<()> {
        for (index, doc) in docs.into_iter().enumerate() {
            if outcome.succeeded.binary_search(&index).is_ok() {
                models[index] = from_document(&self.schema, doc)?;
            }
        }
        Ok(())
    }
}
