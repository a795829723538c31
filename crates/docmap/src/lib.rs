//! Docmap: typed repositories over document databases
//!
//! This crate maps plain Rust records to documents and gives them a small,
//! strongly typed data-access layer:
//!
//! - **Schemas at compile time**: `#[derive(Model)]` resolves identity,
//!   version and storage names once, from `#[model]` and `#[serde]` attributes
//! - **Declarative search**: `#[derive(Filter)]` structs become query
//!   documents, with sort specs, field allowlists and page windows
//! - **Optimistic writes**: versioned updates and patches tell a stale
//!   version (`-1`) apart from a missing record (`0`)
//! - **Bulk writes**: unordered batches report which inputs failed
//!
//! # Backend Features
//!
//! - `mongodb` (default) - MongoDB through the official driver
//!
//! The in-memory backend in [`backends::memory`] is always available.
//!
//! # Architecture
//!
//! - [`schema`] - field tables, identity handling and version arithmetic
//! - [`query`] - filter, sort and projection builders
//! - [`core`] - the store and collection traits backends implement
//! - [`repository`] - reads, searches and the optimistic write path
//! - [`batch`] - bulk and streaming writes
//! - [`mapper`] - document rewriting between record and stored shape
//! - [`health`], [`passcode`], [`export`] - small services over a store
//!
//! # Quick Start
//!
//! ```ignore
//! use docmap::backends::memory::MemoryStore;
//! use docmap::{Model, Repository, WriteOutcome};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize, Model)]
//! #[serde(rename_all = "camelCase")]
//! pub struct User {
//!     #[serde(rename = "_id")]
//!     #[model(object_id_hex)]
//!     pub id: String,
//!     pub user_name: String,
//!     #[model(version)]
//!     pub version: i32,
//! }
//!
//! let store = MemoryStore::new();
//! let users = Repository::<User>::new(&store, "users")?;
//!
//! let mut user = User { user_name: "ann".into(), ..Default::default() };
//! users.create(&mut user).await?;
//! assert_eq!(user.version, 1);
//!
//! let mut stale = user.clone();
//! users.update(&mut user).await?;
//! assert_eq!(users.update(&mut stale).await?, WriteOutcome::Conflict);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// Lets the derive macros name `::docmap` from inside this crate.
extern crate self as docmap;

pub mod backends;
pub mod batch;
pub mod core;
pub mod error;
pub mod export;
pub mod health;
pub mod mapper;
pub mod model;
pub mod passcode;
pub mod query;
pub mod repository;
pub mod schema;
pub mod types;

pub use docmap_macro::{Filter, Model};

// Re-export commonly used types at crate root
pub use error::{StorageError, StorageResult};
pub use model::Model;
pub use query::{Filter, SearchEnvelope};
pub use repository::{Patch, Repository};
pub use schema::{ModelSchema, VersionWidth};
pub use types::{BulkOutcome, SearchPage, WriteOutcome};

// Re-export core traits
pub use core::{DocumentCollection, DocumentStore};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
