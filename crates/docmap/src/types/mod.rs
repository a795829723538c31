//! Value types shared across the crate.
//!
//! - [`PageWindow`] - skip/limit window for a page of results
//! - [`SearchPage`] - a decoded page plus the total match count
//! - [`WriteOutcome`] - result of a single optimistic write
//! - [`BulkOutcome`] - succeeded/failed partition of a batch write

mod outcome;
mod pagination;

pub use outcome::{BulkOutcome, WriteOutcome};
pub use pagination::{PageWindow, SearchPage};
