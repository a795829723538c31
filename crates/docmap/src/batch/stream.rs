//! Buffered writer that flushes in fixed-size batches.

use tracing::debug;

use crate::error::StorageResult;
use crate::model::Model;
use crate::types::BulkOutcome;

use super::writer::BatchWriter;

/// Buffers records and upserts them through a [`BatchWriter`] whenever the
/// buffer reaches `batch_size`.
///
/// Call [`flush`](Self::flush) once the input ends; records still buffered
/// when the writer is dropped are discarded. The buffer is cleared by every
/// flush, whether or not the batch succeeded.
#[derive(Debug)]
pub struct StreamWriter<T: Model> {
    writer: BatchWriter<T>,
    batch_size: usize,
    buffer: Vec<T>,
}

impl<T: Model> StreamWriter<T> {
    /// Creates a stream writer; a `batch_size` of 0 is treated as 1.
    pub fn new(writer: BatchWriter<T>, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            writer,
            batch_size,
            buffer: Vec::with_capacity(batch_size),
        }
    }

    /// Number of buffered records.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Buffers a record, flushing when the batch is full.
    ///
    /// Returns the outcome of the flush, if one happened.
    pub async fn write(&mut self, model: T) -> StorageResult<Option<BulkOutcome>> {
        self.buffer.push(model);
        if self.buffer.len() >= self.batch_size {
            return self.flush().await;
        }
        Ok(None)
    }

    /// Writes every buffered record; returns `None` if the buffer was empty.
    ///
    /// Indices in the outcome refer to positions within the flushed batch.
    pub async fn flush(&mut self) -> StorageResult<Option<BulkOutcome>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let mut batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.batch_size));
        debug!(records = batch.len(), "flushing stream batch");
        self.writer.upsert_many(&mut batch).await.map(Some)
    }
}
