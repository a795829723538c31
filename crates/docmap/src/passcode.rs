//! One-time passcode storage.

use std::sync::Arc;

use bson::{Bson, Document, doc};
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::core::{DocumentCollection, DocumentStore};
use crate::error::StorageResult;

/// Default storage key of the code.
pub const DEFAULT_PASSCODE_FIELD: &str = "passcode";

/// Default storage key of the expiry.
pub const DEFAULT_EXPIRY_FIELD: &str = "expiredAt";

/// A passcode and the instant it stops being valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPasscode {
    /// The code; empty when none is stored.
    pub code: String,
    /// Expiry; already past when none is stored.
    pub expired_at: DateTime<Utc>,
}

impl StoredPasscode {
    fn absent() -> Self {
        Self {
            code: String::new(),
            expired_at: Utc::now() - Duration::hours(24),
        }
    }

    /// Returns `true` if `now` is before the expiry.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.code.is_empty() && now < self.expired_at
    }
}

/// Stores `{ _id, passcode, expiredAt }` documents keyed by a string id.
#[derive(Debug, Clone)]
pub struct PasscodeRepository {
    collection: Arc<dyn DocumentCollection>,
    passcode_field: String,
    expiry_field: String,
}

impl PasscodeRepository {
    /// Creates a repository over the named collection with the default keys.
    pub fn new(store: &dyn DocumentStore, collection: &str) -> Self {
        Self::with_collection(store.collection(collection))
    }

    /// Creates a repository over an existing collection handle.
    pub fn with_collection(collection: Arc<dyn DocumentCollection>) -> Self {
        Self {
            collection,
            passcode_field: DEFAULT_PASSCODE_FIELD.to_string(),
            expiry_field: DEFAULT_EXPIRY_FIELD.to_string(),
        }
    }

    /// Overrides the storage keys; empty names keep the defaults.
    pub fn with_fields(mut self, passcode_field: &str, expiry_field: &str) -> Self {
        if !passcode_field.is_empty() {
            self.passcode_field = passcode_field.to_string();
        }
        if !expiry_field.is_empty() {
            self.expiry_field = expiry_field.to_string();
        }
        self
    }

    /// Stores a code for `id`, replacing any previous one.
    ///
    /// Returns the affected rows: modified, else upserted, else matched.
    pub async fn save(
        &self,
        id: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> StorageResult<u64> {
        let mut set = Document::new();
        set.insert("_id", id);
        set.insert(self.passcode_field.clone(), code);
        set.insert(
            self.expiry_field.clone(),
            Bson::DateTime(bson::DateTime::from_chrono(expires_at)),
        );
        let counts = self
            .collection
            .update_one(doc! { "_id": id }, doc! { "$set": set }, true)
            .await?;
        debug!(collection = %self.collection.name(), rows = counts.rows(), "passcode saved");
        Ok(counts.rows())
    }

    /// Loads the code stored for `id`.
    ///
    /// An absent record yields an empty code that expired a day ago.
    pub async fn load(&self, id: &str) -> StorageResult<StoredPasscode> {
        let Some(stored) = self.collection.find_one(doc! { "_id": id }).await? else {
            return Ok(StoredPasscode::absent());
        };
        let code = match stored.get(&self.passcode_field) {
            Some(Bson::String(code)) => code.clone(),
            Some(Bson::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let expired_at = match stored.get(&self.expiry_field) {
            Some(Bson::DateTime(at)) => at.to_chrono(),
            _ => StoredPasscode::absent().expired_at,
        };
        Ok(StoredPasscode { code, expired_at })
    }

    /// Removes the code stored for `id`; returns the deleted count.
    pub async fn delete(&self, id: &str) -> StorageResult<u64> {
        self.collection.delete_one(doc! { "_id": id }).await
    }
}
