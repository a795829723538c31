//! Core backend traits.
//!
//! - [`DocumentStore`] - a connected database that hands out collections
//! - [`DocumentCollection`] - the driver operations the mapping layer issues
//!
//! Everything above this seam (repositories, batch writers, health checks,
//! exporters) is backend-agnostic.

mod backend;
mod collection;

pub use backend::{BackendKind, DocumentStore};
pub use collection::{DocumentCollection, FindSpec, UpdateCounts, WriteOp};
pub(crate) use collection::unmatched_indices;
