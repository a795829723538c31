//! Query, sort and projection builders.
//!
//! A [`Filter`] describes a search as a list of [`Criterion`] values (one per
//! filter field) plus an optional [`SearchEnvelope`]. [`QueryBuilder`] turns
//! that description into a query document for a particular model schema:
//!
//! | Field value                  | Clause                               |
//! |------------------------------|--------------------------------------|
//! | `None`, `0`, `false`, `""`   | nothing                              |
//! | non-empty text               | prefix / contains / equality match   |
//! | non-empty `Vec`              | `$in`                                |
//! | range types                  | `$gte` / `$gt` / `$lte` / `$lt`      |
//! | other scalars                | equality or the field's operator     |
//!
//! The envelope adds the free-text keyword (an `$or` over every empty text
//! field tagged `keyword`), the excluded identities (`$nin`) and the field
//! allowlist (projection).

mod builder;
mod criterion;
mod envelope;
mod sort;

pub use builder::{BuiltQuery, Filter, QueryBuilder, text_match};
pub use criterion::{
    Criterion, CriterionValue, DateRange, IntRange, MatchStyle, NumberRange, Operator,
    RangeClause, TimeRange, ToCriterion,
};
pub use envelope::SearchEnvelope;
pub use sort::{SortDirection, SortKey, build_sort, sort_document};
