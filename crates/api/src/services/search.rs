//! Catalog search and name suggestions.

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use emporium_core::{CategoryId, Page, PageRequest};

use crate::db::products::{self, SearchFilter};
use crate::error::{AppError, Result};
use crate::models::ProductView;
use crate::models::product::ProductSort;
use crate::services::cache::keys;
use crate::state::AppState;

/// Maximum number of suggestions returned.
pub const MAX_SUGGESTIONS: i64 = 10;

/// Query string of `GET /api/search`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub category_id: Option<CategoryId>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub in_stock: Option<bool>,
    #[serde(default)]
    pub sort: Option<ProductSort>,
}

impl SearchQuery {
    /// Validate and turn into a repository filter.
    ///
    /// A blank `q` is treated as absent. Without text, `relevance` sorts like
    /// `newest`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for negative prices or
    /// `min_price > max_price`.
    pub fn into_filter(self) -> Result<SearchFilter> {
        for price in [self.min_price, self.max_price].into_iter().flatten() {
            if price < Decimal::ZERO {
                return Err(AppError::validation("prices must not be negative"));
            }
        }
        if let (Some(min), Some(max)) = (self.min_price, self.max_price)
            && min > max
        {
            return Err(AppError::validation(
                "min_price must not be greater than max_price",
            ));
        }

        let text = self
            .q
            .map(|q| q.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|q| !q.is_empty());
        let sort = self.sort.unwrap_or(if text.is_some() {
            ProductSort::Relevance
        } else {
            ProductSort::Newest
        });

        Ok(SearchFilter {
            text,
            category_id: self.category_id,
            min_price: self.min_price,
            max_price: self.max_price,
            in_stock: self.in_stock,
            sort,
        })
    }
}

/// Cache key for a normalized filter and page.
#[must_use]
pub fn cache_key(filter: &SearchFilter, page: PageRequest) -> String {
    let page = page.clamped();
    let opt = |v: Option<String>| v.unwrap_or_default();
    format!(
        "{}q={}|cat={}|min={}|max={}|stock={}|sort={:?}|p={}|pp={}",
        keys::SEARCH_PREFIX,
        opt(filter.text.as_ref().map(|t| t.to_lowercase())),
        opt(filter.category_id.map(|c| c.to_string())),
        opt(filter.min_price.map(|d| d.normalize().to_string())),
        opt(filter.max_price.map(|d| d.normalize().to_string())),
        opt(filter.in_stock.map(|b| b.to_string())),
        filter.sort,
        page.page,
        page.per_page,
    )
}

pub struct SearchService<'a> {
    state: &'a AppState,
}

impl<'a> SearchService<'a> {
    #[must_use]
    pub const fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// # Errors
    ///
    /// Returns `AppError::Validation` for an inconsistent price range.
    #[instrument(skip(self))]
    pub async fn search(&self, query: SearchQuery, page: PageRequest) -> Result<Page<ProductView>> {
        let filter = query.into_filter()?;
        let key = cache_key(&filter, page);
        if let Some(hit) = self.state.cache().get(&key).await {
            return Ok(hit);
        }

        let (rows, total) = products::search(self.state.pool(), &filter, page).await?;
        let items = rows
            .into_iter()
            .map(|row| ProductView::new(row.product, row.rating))
            .collect();
        let result = Page::new(items, page, total);

        tracing::debug!(total, "Search executed");
        self.state.cache().set(key, &result).await;
        Ok(result)
    }

    /// Up to ten product names starting with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if the query fails.
    pub async fn suggest(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return Ok(Vec::new());
        }
        let names = products::suggest_names(self.state.pool(), prefix, MAX_SUGGESTIONS).await?;
        Ok(names)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::product::tests::dec;

    #[test]
    fn test_min_above_max_rejected() {
        let query = SearchQuery {
            min_price: Some(dec("100")),
            max_price: Some(dec("20")),
            ..SearchQuery::default()
        };
        assert!(matches!(query.into_filter(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_equal_bounds_allowed() {
        let query = SearchQuery {
            min_price: Some(dec("20")),
            max_price: Some(dec("20")),
            ..SearchQuery::default()
        };
        assert!(query.into_filter().is_ok());
    }

    #[test]
    fn test_blank_text_dropped_and_sort_defaults() {
        let filter = SearchQuery {
            q: Some("   ".to_string()),
            ..SearchQuery::default()
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.text, None);
        assert_eq!(filter.sort, ProductSort::Newest);

        let filter = SearchQuery {
            q: Some("  french   press ".to_string()),
            ..SearchQuery::default()
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.text.as_deref(), Some("french press"));
        assert_eq!(filter.sort, ProductSort::Relevance);
    }

    #[test]
    fn test_cache_key_normalizes() {
        let a = SearchQuery {
            q: Some("French  Press".to_string()),
            min_price: Some(dec("10.0")),
            ..SearchQuery::default()
        }
        .into_filter()
        .unwrap();
        let b = SearchQuery {
            q: Some("french press".to_string()),
            min_price: Some(dec("10")),
            ..SearchQuery::default()
        }
        .into_filter()
        .unwrap();
        let page = PageRequest::default();
        assert_eq!(cache_key(&a, page), cache_key(&b, page));
        assert!(cache_key(&a, page).starts_with(keys::SEARCH_PREFIX));
        assert_ne!(cache_key(&a, page), cache_key(&a, PageRequest::new(2, 20)));
    }
}
