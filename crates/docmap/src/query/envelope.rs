//! The search envelope carried by filter types.

use serde::{Deserialize, Serialize};

/// Cross-cutting search parameters embedded in a filter.
///
/// Mark the field with `#[filter(envelope)]` when deriving
/// [`Filter`](crate::query::Filter).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchEnvelope {
    /// Read names of the fields to return; empty means all fields.
    pub fields: Vec<String>,
    /// Free-text keyword, applied to fields tagged with `keyword`.
    pub q: Option<String>,
    /// Identity values to leave out of the result.
    pub excluding: Vec<String>,
    /// Sort specification, e.g. `"-createdAt,userName"`.
    pub sort: Option<String>,
    /// 1-based page number.
    pub page_index: i64,
    /// Page length; zero or negative disables windowing.
    pub page_size: i64,
    /// Length of the first page when it differs from `page_size`.
    pub first_page_size: i64,
}

impl SearchEnvelope {
    /// Creates an envelope for the given page.
    pub fn page(page_index: i64, page_size: i64) -> Self {
        Self {
            page_index,
            page_size,
            ..Default::default()
        }
    }

    /// Sets the free-text keyword.
    pub fn with_keyword(mut self, q: impl Into<String>) -> Self {
        self.q = Some(q.into());
        self
    }

    /// Sets the sort specification.
    pub fn with_sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    /// Sets the field allowlist.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the excluded identities.
    pub fn with_excluding<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluding = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Sets a distinct first page size.
    pub fn with_first_page_size(mut self, first_page_size: i64) -> Self {
        self.first_page_size = first_page_size;
        self
    }

    /// The trimmed keyword, if one is set.
    pub fn keyword(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}
