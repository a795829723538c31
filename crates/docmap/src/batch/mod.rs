//! Batch and streaming writes.
//!
//! - [`BatchWriter`] - one unordered bulk request per slice of records,
//!   reporting succeeded and failed input indices
//! - [`StreamWriter`] - buffers records and flushes them through a
//!   [`BatchWriter`] in fixed-size batches

mod stream;
mod writer;

pub use stream::StreamWriter;
pub use writer::{BatchWriter, FailurePolicy};
