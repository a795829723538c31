//! MongoDB backend over the official driver.

mod config;

pub use config::MongoConfig;

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use tracing::{debug, info};

use crate::core::{
    BackendKind, DocumentCollection, DocumentStore, FindSpec, UpdateCounts, WriteOp,
    unmatched_indices,
};
use crate::error::{BackendError, StorageError, StorageResult};

const BACKEND_NAME: &str = "mongodb";

/// A connected MongoDB database.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    database: Database,
    config: MongoConfig,
}

impl Debug for MongoStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoStore")
            .field("database", &self.config.database)
            .field("max_pool_size", &self.config.max_pool_size)
            .finish_non_exhaustive()
    }
}

impl MongoStore {
    /// Connects with the given configuration.
    ///
    /// The driver connects lazily; use [`DocumentStore::ping`] to verify the
    /// server is reachable.
    pub async fn connect(config: &MongoConfig) -> StorageResult<Self> {
        let mut options = ClientOptions::parse(&config.uri).await.map_err(|e| {
            StorageError::Backend(BackendError::ConnectionFailed {
                backend_name: BACKEND_NAME.to_string(),
                message: format!("invalid connection string: {}", e),
            })
        })?;

        if config.max_pool_size > 0 {
            options.max_pool_size = Some(config.max_pool_size);
        }
        if config.min_pool_size > 0 {
            options.min_pool_size = Some(config.min_pool_size);
        }
        if let Some(timeout) = config.connect_timeout() {
            options.connect_timeout = Some(timeout);
        }
        if let Some(timeout) = config.server_selection_timeout() {
            options.server_selection_timeout = Some(timeout);
        }
        if let Some(threshold) = config.local_threshold() {
            options.local_threshold = Some(threshold);
        }
        if let Some(interval) = config.heartbeat_interval() {
            options.heartbeat_freq = Some(interval);
        }
        if let Some(app_name) = &config.app_name {
            options.app_name = Some(app_name.clone());
        }
        if config.username.is_some() {
            let mut credential = options.credential.take().unwrap_or_default();
            credential.username = config.username.clone();
            credential.password = config.password.clone();
            if config.auth_source.is_some() {
                credential.source = config.auth_source.clone();
            }
            options.credential = Some(credential);
        } else if let Some(source) = &config.auth_source {
            let mut credential = options.credential.take().unwrap_or_default();
            credential.source = Some(source.clone());
            options.credential = Some(credential);
        }

        let client = Client::with_options(options).map_err(|e| {
            StorageError::Backend(BackendError::ConnectionFailed {
                backend_name: BACKEND_NAME.to_string(),
                message: e.to_string(),
            })
        })?;
        let database = client.database(&config.database);

        info!(database = %config.database, "MongoDB client configured");

        Ok(Self {
            client,
            database,
            config: config.clone(),
        })
    }

    /// Connects using [`MongoConfig::from_env`].
    pub async fn from_env() -> StorageResult<Self> {
        Self::connect(&MongoConfig::from_env()).await
    }

    /// Returns the underlying driver database.
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Returns the underlying driver client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Creates an ascending unique index on `field` and returns its name.
    pub async fn create_unique_index(
        &self,
        collection: &str,
        field: &str,
    ) -> StorageResult<String> {
        let mut keys = Document::new();
        keys.insert(field, 1);
        let mut options = IndexOptions::default();
        options.unique = Some(true);
        let mut model = IndexModel::default();
        model.keys = keys;
        model.options = Some(options);
        let created = self
            .database
            .collection::<Document>(collection)
            .create_index(model)
            .await?;
        Ok(created.index_name)
    }

    /// Returns the concrete collection handle.
    pub fn mongo_collection(&self, name: &str) -> MongoCollection {
        MongoCollection {
            collection: self.database.collection(name),
        }
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn kind(&self) -> BackendKind {
        BackendKind::MongoDB
    }

    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn collection(&self, name: &str) -> Arc<dyn DocumentCollection> {
        Arc::new(self.mongo_collection(name))
    }

    async fn ping(&self) -> Result<(), BackendError> {
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(|e| BackendError::ConnectionFailed {
                backend_name: BACKEND_NAME.to_string(),
                message: e.to_string(),
            })
    }

    async fn server_version(&self) -> Result<Option<String>, BackendError> {
        let status = self
            .database
            .run_command(doc! { "serverStatus": 1 })
            .await
            .map_err(|e| BackendError::ConnectionFailed {
                backend_name: BACKEND_NAME.to_string(),
                message: e.to_string(),
            })?;
        Ok(status.get_str("version").ok().map(str::to_string))
    }
}

/// A MongoDB collection.
#[derive(Debug, Clone)]
pub struct MongoCollection {
    collection: Collection<Document>,
}

impl MongoCollection {
    /// Returns the underlying driver collection.
    pub fn inner(&self) -> &Collection<Document> {
        &self.collection
    }

    async fn run(&self, op: WriteOp) -> StorageResult<u64> {
        match op {
            WriteOp::InsertOne(doc) => {
                self.collection.insert_one(doc).await?;
                Ok(1)
            }
            WriteOp::UpdateOne {
                filter,
                update,
                upsert,
            } => Ok(self.update_one(filter, update, upsert).await?.rows()),
            WriteOp::ReplaceOne {
                filter,
                replacement,
                upsert,
            } => Ok(self.replace_one(filter, replacement, upsert).await?.rows()),
            WriteOp::DeleteOne { filter } => self.delete_one(filter).await,
        }
    }
}

#[async_trait]
impl DocumentCollection for MongoCollection {
    fn name(&self) -> &str {
        self.collection.name()
    }

    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn find(&self, filter: Document, spec: FindSpec) -> StorageResult<Vec<Document>> {
        let cursor = self.find_stream(filter, spec).await?;
        cursor.try_collect().await
    }

    async fn find_stream(
        &self,
        filter: Document,
        spec: FindSpec,
    ) -> StorageResult<BoxStream<'static, StorageResult<Document>>> {
        let mut find = self.collection.find(filter);
        if let Some(projection) = spec.projection {
            find = find.projection(projection);
        }
        if let Some(sort) = spec.sort {
            find = find.sort(sort);
        }
        if let Some(skip) = spec.skip {
            find = find.skip(skip);
        }
        if let Some(limit) = spec.limit {
            find = find.limit(limit);
        }
        let cursor = find.await?;
        Ok(cursor.map_err(StorageError::from).boxed())
    }

    async fn find_one(&self, filter: Document) -> StorageResult<Option<Document>> {
        Ok(self.collection.find_one(filter).await?)
    }

    async fn count(&self, filter: Document) -> StorageResult<u64> {
        Ok(self.collection.count_documents(filter).await?)
    }

    async fn insert_one(&self, doc: Document) -> StorageResult<Bson> {
        Ok(self.collection.insert_one(doc).await?.inserted_id)
    }

    async fn insert_many(&self, docs: Vec<Document>) -> StorageResult<Vec<Bson>> {
        let result = self.collection.insert_many(docs).ordered(false).await?;
        let mut ids: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
        ids.sort_by_key(|(index, _)| *index);
        Ok(ids.into_iter().map(|(_, id)| id).collect())
    }

    async fn update_one(
        &self,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> StorageResult<UpdateCounts> {
        let result = self
            .collection
            .update_one(filter, update)
            .upsert(upsert)
            .await?;
        Ok(UpdateCounts {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn replace_one(
        &self,
        filter: Document,
        replacement: Document,
        upsert: bool,
    ) -> StorageResult<UpdateCounts> {
        let result = self
            .collection
            .replace_one(filter, replacement)
            .upsert(upsert)
            .await?;
        Ok(UpdateCounts {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn delete_one(&self, filter: Document) -> StorageResult<u64> {
        Ok(self.collection.delete_one(filter).await?.deleted_count)
    }

    /// Pure insert batches go through one unordered `insertMany`; mixed
    /// batches run every operation concurrently and collect the failures.
    async fn bulk_write(&self, ops: Vec<WriteOp>) -> StorageResult<Vec<u64>> {
        let total = ops.len();
        if ops.iter().all(|op| matches!(op, WriteOp::InsertOne(_))) {
            let docs = ops
                .into_iter()
                .filter_map(|op| match op {
                    WriteOp::InsertOne(doc) => Some(doc),
                    _ => None,
                })
                .collect::<Vec<_>>();
            if docs.is_empty() {
                return Ok(Vec::new());
            }
            let inserted = self.insert_many(docs).await?;
            return Ok(vec![1; inserted.len()]);
        }

        let results = futures::future::join_all(ops.into_iter().map(|op| self.run(op))).await;
        let mut counts = Vec::with_capacity(total);
        let mut failed = Vec::new();
        let mut first_error = None;
        for (index, result) in results.into_iter().enumerate() {
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
                debug!(
                    collection = %self.collection.name(),
                    failed = failed.len(),
                    total,
                    "bulk_write partially failed"
                );
                let unmatched = unmatched_indices(&counts, &failed);
                Err(BackendError::BulkWrite {
                    backend_name: BACKEND_NAME.to_string(),
                    failed,
                    unmatched,
                    message: err.to_string(),
                }
                .into())
            }
            None => Ok(counts),
        }
    }
}
