//! Page-based access to query results.

use serde::{Deserialize, Serialize};

/// Default number of items per page.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Maximum allowed items per page.
pub const MAX_PAGE_SIZE: u32 = 200;

/// A 1-indexed page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Pagination {
    /// Creates a page request. `page` is clamped to at least 1 and `per_page`
    /// to `1..=MAX_PAGE_SIZE`.
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn from_query(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self::new(page.unwrap_or(1), per_page.unwrap_or(DEFAULT_PAGE_SIZE))
    }

    /// Number of items to skip.
    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.per_page as usize
    }

    pub fn limit(&self) -> usize {
        self.per_page as usize
    }

    /// Total number of pages for `total_items`; at least 1.
    pub fn total_pages(&self, total_items: u64) -> u32 {
        if total_items == 0 {
            return 1;
        }
        total_items.div_ceil(self.per_page as u64) as u32
    }
}

/// One page of results plus totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl<T> PaginatedResult<T> {
    pub fn new(items: Vec<T>, total: u64, pagination: &Pagination) -> Self {
        Self {
            items,
            total,
            page: pagination.page,
            per_page: pagination.per_page,
            total_pages: pagination.total_pages(total),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn has_next_page(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_previous_page(&self) -> bool {
        self.page > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamping() {
        assert_eq!(Pagination::new(0, 0), Pagination::new(1, 1));
        assert_eq!(Pagination::new(3, 10_000).per_page, MAX_PAGE_SIZE);
        assert_eq!(Pagination::from_query(None, None), Pagination::default());
    }

    #[test]
    fn test_offset_and_total_pages() {
        let p = Pagination::new(3, 20);
        assert_eq!(p.offset(), 40);
        assert_eq!(p.limit(), 20);
        assert_eq!(p.total_pages(0), 1);
        assert_eq!(p.total_pages(40), 2);
        assert_eq!(p.total_pages(41), 3);
    }

    #[test]
    fn test_paginated_result_navigation() {
        let p = Pagination::new(2, 2);
        let result = PaginatedResult::new(vec!["c", "d"], 5, &p);
        assert_eq!(result.total_pages, 3);
        assert!(result.has_next_page());
        assert!(result.has_previous_page());
        assert_eq!(result.len(), 2);
    }
}
