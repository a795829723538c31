//! Write result types.

use crate::error::StorageError;

/// Result of a single create, update, patch or save.
///
/// `Conflict` and `Duplicate` are expected outcomes of optimistic writes,
/// not errors. [`rows`](WriteOutcome::rows) gives the classic integer form:
/// affected rows, `0` for not found or duplicate, `-1` for a version conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteOutcome {
    /// The write went through and touched this many documents.
    Applied(u64),
    /// No document with the identity exists.
    NotFound,
    /// The document exists but its version differs from the expected one.
    Conflict,
    /// An insert hit a unique key.
    Duplicate,
}

impl WriteOutcome {
    /// Affected rows, `0` for not found / duplicate, `-1` for a conflict.
    pub fn rows(self) -> i64 {
        match self {
            WriteOutcome::Applied(n) => i64::try_from(n).unwrap_or(i64::MAX),
            WriteOutcome::NotFound | WriteOutcome::Duplicate => 0,
            WriteOutcome::Conflict => -1,
        }
    }

    /// Returns `true` if at least one document was written.
    pub fn is_applied(self) -> bool {
        matches!(self, WriteOutcome::Applied(n) if n > 0)
    }

    /// Returns `true` for a version conflict.
    pub fn is_conflict(self) -> bool {
        self == WriteOutcome::Conflict
    }
}

/// Partition of a batch write's input indices.
#[derive(Debug, Default)]
pub struct BulkOutcome {
    /// 0-based indices of the records that were written.
    pub succeeded: Vec<usize>,
    /// 0-based indices of the records that failed.
    pub failed: Vec<usize>,
    /// The backend error behind the failures, when there was one.
    pub cause: Option<StorageError>,
}

impl BulkOutcome {
    /// Every index in `0..len` succeeded.
    pub fn all_succeeded(len: usize) -> Self {
        Self {
            succeeded: (0..len).collect(),
            ..Default::default()
        }
    }

    /// Every index in `0..len` failed.
    pub fn all_failed(len: usize, cause: StorageError) -> Self {
        Self {
            failed: (0..len).collect(),
            cause: Some(cause),
            ..Default::default()
        }
    }

    /// Splits `0..len` into the named failures and everything else.
    pub fn partition(len: usize, failed: &[usize], cause: StorageError) -> Self {
        let mut failed: Vec<usize> = failed.iter().copied().filter(|i| *i < len).collect();
        failed.sort_unstable();
        failed.dedup();
        let succeeded = (0..len).filter(|i| failed.binary_search(i).is_err()).collect();
        Self {
            succeeded,
            failed,
            cause: Some(cause),
        }
    }

    /// Returns `true` if nothing failed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
