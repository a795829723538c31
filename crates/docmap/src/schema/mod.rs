//! Static model schemas.
//!
//! A [`ModelSchema`] is the resolved field table of one record type: which
//! field is the identity, which one is the optimistic-concurrency version,
//! and how every field's read name maps to its storage key. Schemas are
//! generated by `#[derive(Model)]` and built once per repository.

mod descriptor;
mod version;

pub use descriptor::{FieldDescriptor, IdentityKind, ModelSchema, ModelSchemaBuilder, is_empty_identity};
pub use version::{VersionWidth, next_dynamic, read_version};
