//! Typed repositories over one collection.
//!
//! A [`Repository<T>`] owns the schema of `T` and a collection handle, and
//! implements the read path (load, exist, filtered and paged search) and the
//! optimistic write path (create, update, patch, save, delete).
//!
//! # Optimistic writes
//!
//! For a model with a version field:
//!
//! - `create` stamps the version to 1 before inserting.
//! - `update` and `patch` filter on identity **and** the version the caller
//!   read, and write the version plus one. The in-memory record is advanced
//!   before the write is issued, so after a conflict it is one ahead of the
//!   store; reload before retrying.
//! - When the conditional write matches nothing, an identity-only existence
//!   check tells [`WriteOutcome::Conflict`] (still there, different version)
//!   apart from [`WriteOutcome::NotFound`].
//!
//! A duplicate key on insert is reported as [`WriteOutcome::Duplicate`].

mod patch;

pub use patch::Patch;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use bson::{Bson, Document, doc};
use tracing::{debug, instrument};

use crate::core::{DocumentCollection, DocumentStore, FindSpec};
use crate::error::StorageResult;
use crate::mapper::{Mapper, map_from_store};
use crate::model::{Model, from_document, to_document};
use crate::query::{Filter, QueryBuilder, build_sort, sort_document};
use crate::schema::{IdentityKind, ModelSchema, is_empty_identity};
use crate::types::{PageWindow, SearchPage, WriteOutcome};

/// Typed access to one collection.
pub struct Repository<T: Model> {
    collection: Arc<dyn DocumentCollection>,
    schema: Arc<ModelSchema>,
    mapper: Option<Arc<dyn Mapper>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Model> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            collection: Arc::clone(&self.collection),
            schema: Arc::clone(&self.schema),
            mapper: self.mapper.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Model> fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("model", &self.schema.model_name())
            .field("collection", &self.collection.name())
            .field("mapper", &self.mapper)
            .finish()
    }
}

impl<T: Model> Repository<T> {
    /// Creates a repository over the named collection of `store`.
    ///
    /// Fails if the schema of `T` is malformed.
    pub fn new(store: &dyn DocumentStore, collection: &str) -> StorageResult<Self> {
        Self::with_collection(store.collection(collection))
    }

    /// Creates a repository over an existing collection handle.
    pub fn with_collection(collection: Arc<dyn DocumentCollection>) -> StorageResult<Self> {
        let schema = T::schema()?;
        debug!(
            model = %schema.model_name(),
            collection = %collection.name(),
            versioned = schema.version().is_some(),
            "repository created"
        );
        Ok(Self {
            collection,
            schema: Arc::new(schema),
            mapper: None,
            _marker: PhantomData,
        })
    }

    /// Applies `mapper` to every document written and read.
    pub fn with_mapper(mut self, mapper: impl Mapper + 'static) -> Self {
        self.mapper = Some(Arc::new(mapper));
        self
    }

    /// The schema of `T`.
    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    /// The underlying collection handle.
    pub fn collection(&self) -> &Arc<dyn DocumentCollection> {
        &self.collection
    }

    pub(crate) fn mapper(&self) -> Option<&dyn Mapper> {
        self.mapper.as_deref()
    }

    pub(crate) fn shared_schema(&self) -> Arc<ModelSchema> {
        Arc::clone(&self.schema)
    }

    pub(crate) fn shared_mapper(&self) -> Option<Arc<dyn Mapper>> {
        self.mapper.clone()
    }

    fn id_filter(&self, id: Bson) -> Document {
        let mut filter = Document::new();
        filter.insert(self.schema.identity_key(), self.schema.identity_to_store(id));
        filter
    }

    fn decode_all(&self, docs: Vec<Document>) -> StorageResult<Vec<T>> {
        decode_all(&self.schema, self.mapper(), docs)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Returns every record in the collection.
    pub async fn all(&self) -> StorageResult<Vec<T>> {
        let docs = self.collection.find(doc! {}, FindSpec::default()).await?;
        self.decode_all(docs)
    }

    /// Loads the record with the given identity.
    ///
    /// For `object_id_hex` models pass the hex string.
    pub async fn load(&self, id: impl Into<Bson>) -> StorageResult<Option<T>> {
        self.schema.require_identity()?;
        let filter = self.id_filter(id.into());
        match self.collection.find_one(filter).await? {
            Some(doc) => Ok(Some(decode(&self.schema, self.mapper(), doc)?)),
            None => Ok(None),
        }
    }

    /// Loads every record whose identity is in `ids`, in store order.
    ///
    /// Also returns the requested ids that matched nothing, as given. For
    /// `object_id_hex` models a string that is not valid hex simply ends up
    /// among the missing ids.
    pub async fn load_many<I, V>(&self, ids: I) -> StorageResult<(Vec<T>, Vec<Bson>)>
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.schema.require_identity()?;
        let requested: Vec<(Bson, Bson)> = ids
            .into_iter()
            .map(|id| {
                let id = id.into();
                (self.schema.identity_to_store(id.clone()), id)
            })
            .collect();
        if requested.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let key = self.schema.identity_key();
        let stored: Vec<Bson> = requested.iter().map(|(s, _)| s.clone()).collect();
        let mut filter = Document::new();
        filter.insert(key, doc! { "$in": stored });
        let docs = self.collection.find(filter, FindSpec::default()).await?;

        let found: Vec<&Bson> = docs.iter().filter_map(|d| d.get(key)).collect();
        let missing = requested
            .iter()
            .filter(|(s, _)| !found.contains(&s))
            .map(|(_, id)| id.clone())
            .collect();
        debug!(
            collection = %self.collection.name(),
            requested = requested.len(),
            found = docs.len(),
            "loaded records by identity"
        );
        Ok((self.decode_all(docs)?, missing))
    }

    /// Returns `true` if a record with the identity exists.
    pub async fn exist(&self, id: impl Into<Bson>) -> StorageResult<bool> {
        self.schema.require_identity()?;
        let filter = self.id_filter(id.into());
        Ok(self.collection.find_one(filter).await?.is_some())
    }

    /// Returns every record matching `filter`, sorted by its envelope's sort
    /// spec, without paging.
    pub async fn query<F: Filter + ?Sized>(&self, filter: &F) -> StorageResult<Vec<T>> {
        let (query, spec) = self.plan(filter, None);
        let docs = self.collection.find(query, spec).await?;
        self.decode_all(docs)
    }

    /// Runs a paged search using the page fields of the filter's envelope.
    ///
    /// `total` counts every match regardless of paging. The page and the
    /// count are two separate reads and are not taken from one snapshot;
    /// concurrent writes can make them disagree.
    #[instrument(skip(self, filter), fields(model = %self.schema.model_name()))]
    pub async fn search<F: Filter + ?Sized>(&self, filter: &F) -> StorageResult<SearchPage<T>> {
        let window = filter.envelope().and_then(|e| {
            PageWindow::compute(e.page_index, e.page_size, e.first_page_size)
        });
        self.execute(filter, window).await
    }

    /// Runs a paged search with explicit paging, ignoring the envelope's
    /// page fields.
    pub async fn search_window<F: Filter + ?Sized>(
        &self,
        filter: &F,
        page_index: i64,
        page_size: i64,
        first_page_size: i64,
    ) -> StorageResult<SearchPage<T>> {
        let window = PageWindow::compute(page_index, page_size, first_page_size);
        self.execute(filter, window).await
    }

    fn plan<F: Filter + ?Sized>(
        &self,
        filter: &F,
        window: Option<PageWindow>,
    ) -> (Document, FindSpec) {
        let built = QueryBuilder::new(&self.schema).build(filter);
        let sort = filter
            .envelope()
            .and_then(|e| e.sort.as_deref())
            .and_then(|spec| sort_document(&build_sort(spec, &self.schema)));
        let mut spec = FindSpec::default()
            .with_projection(built.projection)
            .with_sort(sort);
        if let Some(window) = window {
            spec = spec.with_window(window.skip, window.limit);
        }
        (built.filter, spec)
    }

    async fn execute<F: Filter + ?Sized>(
        &self,
        filter: &F,
        window: Option<PageWindow>,
    ) -> StorageResult<SearchPage<T>> {
        let (query, spec) = self.plan(filter, window);
        let docs = self.collection.find(query.clone(), spec).await?;
        let total = self.collection.count(query).await?;
        let items = self.decode_all(docs)?;
        Ok(SearchPage { items, total })
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Inserts a record.
    ///
    /// A versioned record is stamped with version 1. An empty identity is
    /// left to the database and the assigned key is written back into
    /// `model`. Returns [`WriteOutcome::Duplicate`] when a unique key
    /// rejects the insert; `model` is left untouched in that case.
    #[instrument(skip(self, model), fields(model = %self.schema.model_name()))]
    pub async fn create(&self, model: &mut T) -> StorageResult<WriteOutcome> {
        let mut doc = to_document(&self.schema, model)?;
        if let Some((field, width)) = self.schema.version() {
            doc.insert(field.bson.clone(), width.initial());
        }

        let key = self.schema.identity_key().to_string();
        let original_id = doc.get(&key).cloned();
        let stored = to_store(&self.schema, self.mapper(), doc.clone())?;

        match self.collection.insert_one(stored).await {
            Ok(assigned) => {
                if self.schema.resolve_identity().is_some()
                    && is_empty_identity(original_id.as_ref())
                {
                    doc.insert(key, back_fill(&self.schema, original_id.as_ref(), assigned));
                }
                *model = from_document(&self.schema, doc)?;
                Ok(WriteOutcome::Applied(1))
            }
            Err(err) if err.is_duplicate_key() => {
                debug!(model = %self.schema.model_name(), error = %err, "insert hit a unique key");
                Ok(WriteOutcome::Duplicate)
            }
            Err(err) => Err(err),
        }
    }

    /// Replaces the stored fields of a record.
    ///
    /// For versioned models the write only applies if the stored version
    /// equals the version in `model`; on success the stored version is one
    /// greater. `model` carries the incremented version afterwards, whatever
    /// the outcome.
    #[instrument(skip(self, model), fields(model = %self.schema.model_name()))]
    pub async fn update(&self, model: &mut T) -> StorageResult<WriteOutcome> {
        let identity = self.schema.require_identity()?;
        let mut doc = to_document(&self.schema, model)?;
        let id = doc.get(&identity.bson).cloned().unwrap_or(Bson::Null);
        let id_filter = self.id_filter(id);

        let Some((field, width)) = self.schema.version() else {
            let set = self.set_document(doc)?;
            let counts = self
                .collection
                .update_one(id_filter, doc! { "$set": set }, false)
                .await?;
            return Ok(if counts.matched == 0 {
                WriteOutcome::NotFound
            } else {
                WriteOutcome::Applied(counts.rows())
            });
        };

        let current = doc.get(&field.bson).cloned().unwrap_or(Bson::Null);
        let next = width.next(&field.json, &current)?;
        let mut filter = id_filter.clone();
        filter.insert(field.bson.clone(), current);
        doc.insert(field.bson.clone(), next);
        *model = from_document(&self.schema, doc.clone())?;

        let set = self.set_document(doc)?;
        let counts = self
            .collection
            .update_one(filter, doc! { "$set": set }, false)
            .await?;
        if counts.matched == 0 {
            return self.missing_or_conflict(id_filter).await;
        }
        Ok(WriteOutcome::Applied(counts.rows()))
    }

    /// Applies a partial update.
    ///
    /// The patch must carry the identity and, for versioned models, the
    /// version the caller read; the same conflict protocol as
    /// [`update`](Self::update) applies.
    #[instrument(skip(self, patch), fields(model = %self.schema.model_name()))]
    pub async fn patch(&self, patch: &Patch) -> StorageResult<WriteOutcome> {
        let resolved = patch.resolve(&self.schema)?;
        let set = match self.mapper() {
            Some(mapper) => mapper.to_store(resolved.set)?,
            None => resolved.set,
        };
        let counts = self
            .collection
            .update_one(resolved.filter, doc! { "$set": set }, false)
            .await?;
        if counts.matched > 0 {
            return Ok(WriteOutcome::Applied(counts.rows()));
        }
        if resolved.next_version.is_some() {
            return self.missing_or_conflict(resolved.id_filter).await;
        }
        Ok(WriteOutcome::NotFound)
    }

    /// Inserts or updates a record.
    ///
    /// An empty identity always inserts. Otherwise a versioned record is
    /// updated under the version check if it exists and inserted if it does
    /// not; an unversioned record is upserted.
    pub async fn save(&self, model: &mut T) -> StorageResult<WriteOutcome> {
        let identity = self.schema.require_identity()?;
        let doc = to_document(&self.schema, model)?;
        let id = doc.get(&identity.bson).cloned();
        if is_empty_identity(id.as_ref()) {
            return self.create(model).await;
        }
        let id = id.unwrap_or(Bson::Null);

        if self.schema.version().is_some() {
            return if self.exist(id).await? {
                self.update(model).await
            } else {
                self.create(model).await
            };
        }

        let set = self.set_document(doc)?;
        let counts = self
            .collection
            .update_one(self.id_filter(id), doc! { "$set": set }, true)
            .await?;
        Ok(WriteOutcome::Applied(counts.rows()))
    }

    /// Deletes the record with the given identity; returns the deleted count.
    pub async fn delete(&self, id: impl Into<Bson>) -> StorageResult<u64> {
        self.schema.require_identity()?;
        self.collection.delete_one(self.id_filter(id.into())).await
    }

    /// Store form of a record without its identity, for `$set`.
    fn set_document(&self, doc: Document) -> StorageResult<Document> {
        let mut stored = to_store(&self.schema, self.mapper(), doc)?;
        stored.remove(self.schema.identity_key());
        Ok(stored)
    }

    async fn missing_or_conflict(&self, id_filter: Document) -> StorageResult<WriteOutcome> {
        if self.collection.find_one(id_filter).await?.is_some() {
            debug!(model = %self.schema.model_name(), "version conflict");
            Ok(WriteOutcome::Conflict)
        } else {
            Ok(WriteOutcome::NotFound)
        }
    }
}

/// Record-shaped document to stored document.
///
/// Converts the identity to its stored form, drops an empty identity so the
/// database assigns one, then applies the mapper.
pub(crate) fn to_store(
    schema: &ModelSchema,
    mapper: Option<&dyn Mapper>,
    mut doc: Document,
) -> StorageResult<Document> {
    if schema.resolve_identity().is_some() {
        let key = schema.identity_key();
        match doc.remove(key) {
            Some(id) if !is_empty_identity(Some(&id)) => {
                doc.insert(key, schema.identity_to_store(id));
            }
            _ => {}
        }
    }
    Ok(match mapper {
        Some(mapper) => mapper.to_store(doc)?,
        None => doc,
    })
}

/// Stored document to record.
pub(crate) fn decode<T: Model>(
    schema: &ModelSchema,
    mapper: Option<&dyn Mapper>,
    doc: Document,
) -> StorageResult<T> {
    let mut doc = match mapper {
        Some(mapper) => mapper.from_store(doc)?,
        None => doc,
    };
    let key = schema.identity_key();
    if let Some(id) = doc.remove(key) {
        doc.insert(key, schema.identity_to_model(id));
    }
    Ok(from_document(schema, doc)?)
}

pub(crate) fn decode_all<T: Model>(
    schema: &ModelSchema,
    mapper: Option<&dyn Mapper>,
    docs: Vec<Document>,
) -> StorageResult<Vec<T>> {
    let docs = map_from_store(mapper, docs)?;
    docs.into_iter()
        .map(|doc| decode(schema, None, doc))
        .collect()
}

/// Identity value to write back into a record after an insert.
pub(crate) fn back_fill(schema: &ModelSchema, original: Option<&Bson>, assigned: Bson) -> Bson {
    match (schema.identity_kind(), original, assigned) {
        (IdentityKind::ObjectIdHex, _, Bson::ObjectId(oid))
        | (_, Some(Bson::String(_)), Bson::ObjectId(oid)) => Bson::String(oid.to_hex()),
        (_, _, assigned) => assigned,
    }
}

