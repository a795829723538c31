//! # Docmap Derive Macros
//!
//! Compile-time schema generation for `docmap`.
//!
//! ## `Model`
//!
//! Implements `docmap::Model` for a struct with named fields. Storage keys
//! follow serde: a field-level `#[serde(rename = "...")]` wins, then the
//! struct-level `#[serde(rename_all = "...")]`, then the field name. Fields
//! serde skips are left out of the schema.
//!
//! Field attributes:
//!
//! - `#[model(id)]` marks the identity (a field stored as `_id` is picked
//!   up without it)
//! - `#[model(object_id_hex)]` marks a hex-string identity stored as an
//!   ObjectId
//! - `#[model(version)]` marks the optimistic-concurrency counter; the field
//!   must be `i32`, `isize` or `i64`
//! - `#[model(json = "...")]` overrides the read name
//! - `#[model(skip)]` leaves the field out of the schema
//!
//! ```rust,ignore
//! #[derive(Serialize, Deserialize, Model)]
//! #[serde(rename_all = "camelCase")]
//! pub struct User {
//!     #[serde(rename = "_id")]
//!     #[model(object_id_hex)]
//!     pub id: String,
//!     pub user_name: String,
//!     #[model(version)]
//!     pub version: i32,
//! }
//! ```
//!
//! ## `Filter`
//!
//! Implements `docmap::query::Filter`. Every field contributes one criterion
//! named after the field; the target model's schema resolves it.
//!
//! Field attributes:
//!
//! - `#[filter(match = "prefix" | "contain" | "equal")]`
//! - `#[filter(keyword)]`, `#[filter(keyword = "prefix")]` lets the
//!   free-text keyword search this field
//! - `#[filter(operator = ">=")]`, also `">"`, `"<="`, `"<"`, `"!="`
//! - `#[filter(bson = "...")]` sets the storage key directly
//! - `#[filter(envelope)]` marks the `SearchEnvelope` field
//! - `#[filter(skip)]`
//!
//! ```rust,ignore
//! #[derive(Default, Filter)]
//! pub struct UserFilter {
//!     #[filter(envelope)]
//!     pub search: SearchEnvelope,
//!     #[filter(match = "prefix", keyword)]
//!     pub user_name: Option<String>,
//!     #[filter(operator = ">=", bson = "age")]
//!     pub min_age: Option<i32>,
//! }
//! ```

extern crate proc_macro;

mod attrs;
mod filter;
mod model;

use proc_macro::TokenStream;
use syn::{Data, DeriveInput};

/// Derives `docmap::Model`.
#[proc_macro_derive(Model, attributes(model))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let ast = syn::parse_macro_input!(input as DeriveInput);

    match ast.data {
        Data::Struct(ref data) => match model::generate_model(&ast, data) {
            Ok(tokens) => tokens.into(),
            Err(e) => e.to_compile_error().into(),
        },
        Data::Enum(_) | Data::Union(_) => syn::Error::new_spanned(
            &ast.ident,
            "Model can only be derived for structs with named fields",
        )
        .to_compile_error()
        .into(),
    }
}

/// Derives `docmap::query::Filter`.
#[proc_macro_derive(Filter, attributes(filter))]
pub fn derive_filter(input: TokenStream) -> TokenStream {
    let ast = syn::parse_macro_input!(input as DeriveInput);

    match ast.data {
        Data::Struct(ref data) => match filter::generate_filter(&ast, data) {
            Ok(tokens) => tokens.into(),
            Err(e) => e.to_compile_error().into(),
        },
        Data::Enum(_) | Data::Union(_) => syn::Error::new_spanned(
            &ast.ident,
            "Filter can only be derived for structs with named fields",
        )
        .to_compile_error()
        .into(),
    }
}
