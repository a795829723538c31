//! Pagination types for search results.
//!
//! Searches are offset based. The first page may have its own size
//! (`first_page_size`); every later page is a uniform `page_size` window that
//! continues right after it.

use serde::{Deserialize, Serialize};

/// A skip/limit window into a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageWindow {
    /// Number of documents to skip.
    pub skip: u64,
    /// Maximum number of documents to return.
    pub limit: i64,
}

impl PageWindow {
    /// Computes the window for a 1-based page.
    ///
    /// Returns `None` when `page_size` is not positive, meaning the whole
    /// result set is fetched. Page indices below 1 are treated as 1, and a
    /// `first_page_size` of zero or less means "same as `page_size`".
    ///
    /// ```
    /// use docmap::types::PageWindow;
    ///
    /// let page = |i| PageWindow::compute(i, 10, 3).unwrap();
    /// assert_eq!((page(1).skip, page(1).limit), (0, 3));
    /// assert_eq!((page(2).skip, page(2).limit), (3, 10));
    /// assert_eq!(page(3).skip, 13);
    /// ```
    pub fn compute(page_index: i64, page_size: i64, first_page_size: i64) -> Option<Self> {
        if page_size <= 0 {
            return None;
        }
        let page_index = page_index.max(1);

        let (skip, limit) = if first_page_size > 0 {
            if page_index == 1 {
                (0, first_page_size)
            } else {
                (
                    page_size.saturating_mul(page_index - 2).saturating_add(first_page_size),
                    page_size,
                )
            }
        } else {
            (page_size.saturating_mul(page_index - 1), page_size)
        };

        Some(Self {
            skip: skip.max(0) as u64,
            limit,
        })
    }
}

/// One page of decoded search results plus the unwindowed total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPage<T> {
    /// Records in this page.
    pub items: Vec<T>,
    /// Number of records matching the filter, across all pages.
    pub total: u64,
}

impl<T> SearchPage<T> {
    /// Returns `true` if the page holds no records.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maps every item, keeping the total.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> SearchPage<U> {
        SearchPage {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}
