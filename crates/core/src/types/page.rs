//! Pagination request and response envelopes.

use serde::{Deserialize, Serialize};

/// Query-string pagination parameters (`?page=2&per_page=20`).
///
/// Pages are 1-based. Out-of-range values are clamped rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    #[serde(default = "PageRequest::default_page")]
    pub page: u32,
    #[serde(default = "PageRequest::default_per_page")]
    pub per_page: u32,
}

impl PageRequest {
    /// Largest page size a client may request.
    pub const MAX_PER_PAGE: u32 = 100;

    const fn default_page() -> u32 {
        1
    }

    const fn default_per_page() -> u32 {
        20
    }

    /// Create a clamped page request.
    #[must_use]
    pub fn new(page: u32, per_page: u32) -> Self {
        Self { page, per_page }.clamped()
    }

    /// Clamp page to >= 1 and `per_page` to 1..=`MAX_PER_PAGE`.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, Self::MAX_PER_PAGE),
        }
    }

    /// SQL `LIMIT` value.
    #[must_use]
    pub fn limit(&self) -> i64 {
        i64::from(self.clamped().per_page)
    }

    /// SQL `OFFSET` value.
    #[must_use]
    pub fn offset(&self) -> i64 {
        let p = self.clamped();
        i64::from(p.page - 1) * i64::from(p.per_page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: Self::default_page(),
            per_page: Self::default_per_page(),
        }
    }
}

/// A page of results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

impl<T> Page<T> {
    /// Build a page from the rows returned for `request`.
    #[must_use]
    pub fn new(items: Vec<T>, request: PageRequest, total: i64) -> Self {
        let request = request.clamped();
        Self {
            items,
            page: request.page,
            per_page: request.per_page,
            total,
        }
    }

    /// Convert every item, keeping the paging metadata.
    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
        }
    }

    /// Total number of pages.
    #[must_use]
    pub fn total_pages(&self) -> i64 {
        if self.total <= 0 {
            return 0;
        }
        let per_page = i64::from(self.per_page.max(1));
        (self.total + per_page - 1) / per_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_and_limit() {
        let request = PageRequest::new(3, 25);
        assert_eq!(request.limit(), 25);
        assert_eq!(request.offset(), 50);
    }

    #[test]
    fn test_clamping() {
        let request = PageRequest { page: 0, per_page: 10_000 }.clamped();
        assert_eq!(request.page, 1);
        assert_eq!(request.per_page, PageRequest::MAX_PER_PAGE);
        assert_eq!(request.offset(), 0);
    }

    #[test]
    fn test_total_pages() {
        let page = Page::new(vec![1, 2], PageRequest::new(1, 2), 5);
        assert_eq!(page.total_pages(), 3);
        let empty: Page<i32> = Page::new(Vec::new(), PageRequest::default(), 0);
        assert_eq!(empty.total_pages(), 0);
    }

    #[test]
    fn test_map_keeps_metadata() {
        let page = Page::new(vec![1, 2, 3], PageRequest::new(2, 3), 9).map(|n| n * 10);
        assert_eq!(page.items, vec![10, 20, 30]);
        assert_eq!(page.page, 2);
        assert_eq!(page.total, 9);
    }
}
