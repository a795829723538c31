//! Streaming export of a collection into line-oriented output.
//!
//! ```ignore
//! let exporter = Exporter::new(&users).with_sort("userName");
//! let mut file = tokio::fs::File::create("users.jsonl").await?;
//! let written = exporter.export(&mut file).await?;
//! ```

use std::fmt;
use std::sync::Arc;

use bson::Document;
use futures::TryStreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, instrument};

use crate::core::{DocumentCollection, FindSpec};
use crate::error::{MappingError, StorageResult};
use crate::mapper::Mapper;
use crate::model::Model;
use crate::query::{Filter, QueryBuilder, build_sort, sort_document};
use crate::repository::{Repository, decode};
use crate::schema::ModelSchema;

/// Turns one record into one output line, without the line terminator.
pub trait LineFormatter<T>: Send + Sync {
    /// Formats `record`.
    fn format(&self, record: &T) -> StorageResult<String>;
}

impl<T, F> LineFormatter<T> for F
where
    F: Fn(&T) -> StorageResult<String> + Send + Sync,
{
    fn format(&self, record: &T) -> StorageResult<String> {
        self(record)
    }
}

/// Formats records as single-line JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLineFormatter;

impl<T: Model> LineFormatter<T> for JsonLineFormatter {
    fn format(&self, record: &T) -> StorageResult<String> {
        serde_json::to_string(record).map_err(|e| {
            MappingError::Encode {
                model: std::any::type_name::<T>().to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }
}

/// Writes every matching record of a collection as one line each.
pub struct Exporter<T: Model> {
    collection: Arc<dyn DocumentCollection>,
    schema: Arc<ModelSchema>,
    mapper: Option<Arc<dyn Mapper>>,
    formatter: Box<dyn LineFormatter<T>>,
    filter: Document,
    sort: Option<Document>,
}

impl<T: Model> fmt::Debug for Exporter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exporter")
            .field("model", &self.schema.model_name())
            .field("collection", &self.collection.name())
            .field("filter", &self.filter)
            .field("sort", &self.sort)
            .finish_non_exhaustive()
    }
}

impl<T: Model + 'static> Exporter<T> {
    /// Creates an exporter over a repository's collection, writing JSON lines.
    pub fn new(repository: &Repository<T>) -> Self {
        Self {
            collection: Arc::clone(repository.collection()),
            schema: repository.shared_schema(),
            mapper: repository.shared_mapper(),
            formatter: Box::new(JsonLineFormatter),
            filter: Document::new(),
            sort: None,
        }
    }

    /// Replaces the line formatter.
    pub fn with_formatter(mut self, formatter: impl LineFormatter<T> + 'static) -> Self {
        self.formatter = Box::new(formatter);
        self
    }

    /// Restricts the export to records matching `filter`.
    pub fn with_filter<F: Filter + ?Sized>(mut self, filter: &F) -> Self {
        self.filter = QueryBuilder::new(&self.schema).build(filter).filter;
        self
    }

    /// Restricts the export with a raw query document.
    pub fn with_query(mut self, query: Document) -> Self {
        self.filter = query;
        self
    }

    /// Orders the export by a sort spec such as `"-createdAt,userName"`.
    pub fn with_sort(mut self, spec: &str) -> Self {
        self.sort = sort_document(&build_sort(spec, &self.schema));
        self
    }

    /// Streams the records into `out`, one line each, and flushes it.
    ///
    /// Returns the number of records written. On error, the lines written
    /// so far stay in `out`.
    #[instrument(skip_all, fields(collection = %self.collection.name()))]
    pub async fn export<W>(&self, out: &mut W) -> StorageResult<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let spec = FindSpec::default().with_sort(self.sort.clone());
        let mut cursor = self.collection.find_stream(self.filter.clone(), spec).await?;
        let mut written = 0u64;
        while let Some(doc) = cursor.try_next().await? {
            let record: T = decode(&self.schema, self.mapper.as_deref(), doc)?;
            let mut line = self.formatter.format(&record)?;
            line.push('\n');
            out.write_all(line.as_bytes()).await?;
            written += 1;
        }
        out.flush().await?;
        debug!(records = written, "export finished");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryStore;
    use crate::core::DocumentStore;
    use crate::error::SchemaError;
    use crate::schema::{FieldDescriptor, IdentityKind};
    use bson::doc;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct City {
        #[serde(rename = "_id")]
        id: String,
        name: String,
        population: i64,
    }

    impl Model for City {
        fn schema() -> Result<ModelSchema, SchemaError> {
            ModelSchema::builder("City")
                .field(FieldDescriptor::new(0, "id", "_id", "_id"))
                .field(FieldDescriptor::new(1, "name", "name", "name"))
                .field(FieldDescriptor::new(2, "population", "population", "population"))
                .identity("id", IdentityKind::Native)
                .build()
        }
    }

    async fn seeded() -> Repository<City> {
        let store = MemoryStore::new();
        let cities = store.collection("cities");
        let rows = [
            ("c1", "Hue", 650_000i64),
            ("c2", "Da Nang", 1_200_000),
            ("c3", "Can Tho", 1_250_000),
        ];
        for (id, name, population) in rows {
            cities
                .insert_one(doc! { "_id": id, "name": name, "population": population })
                .await
                .unwrap();
        }
        Repository::with_collection(cities).unwrap()
    }

    #[tokio::test]
    async fn test_exports_json_lines_in_sort_order() {
        let repo = seeded().await;
        let mut out = Vec::new();
        let written = Exporter::new(&repo)
            .with_sort("-population")
            .export(&mut out)
            .await
            .unwrap();
        assert_eq!(written, 3);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["name"], "Can Tho");
    }

    #[tokio::test]
    async fn test_closure_formatter_and_query() {
        let repo = seeded().await;
        let mut out = Vec::new();
        let formatter = |city: &City| -> StorageResult<String> {
            Ok(format!("{},{}", city.id, city.population))
        };
        let written = Exporter::new(&repo)
            .with_query(doc! { "population": { "$gt": 1_000_000i64 } })
            .with_sort("name")
            .with_formatter(formatter)
            .export(&mut out)
            .await
            .unwrap();
        assert_eq!(written, 2);
        assert_eq!(String::from_utf8(out).unwrap(), "c3,1250000\nc2,1200000\n");
    }

    fn csv(city: &City) -> StorageResult<String> {
        Ok(format!("{},{}", city.id, city.name))
    }

    #[tokio::test]
    async fn test_writes_one_line_per_record_then_flushes() {
        let repo = seeded().await;
        let mut out = tokio_test::io::Builder::new()
            .write(b"c1,Hue\n")
            .write(b"c2,Da Nang\n")
            .write(b"c3,Can Tho\n")
            .build();
        let written = Exporter::new(&repo)
            .with_sort("_id")
            .with_formatter(csv)
            .export(&mut out)
            .await
            .unwrap();
        assert_eq!(written, 3);
    }

    #[tokio::test]
    async fn test_write_failure_stops_the_export() {
        let repo = seeded().await;
        let mut out = tokio_test::io::Builder::new()
            .write(b"c1,Hue\n")
            .write_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
            .build();
        let err = Exporter::new(&repo)
            .with_sort("_id")
            .with_formatter(csv)
            .export(&mut out)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("closed"));
    }
}
