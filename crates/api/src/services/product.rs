//! Product catalog: public reads with cached detail, admin writes.

use rust_decimal::Decimal;
use tracing::instrument;

use emporium_core::{CategoryId, Page, PageRequest, ProductId};

use crate::db::products::{self, ProductFields, SearchFilter};
use crate::db::{self, categories};
use crate::error::{AppError, Result};
use crate::models::slug::{is_valid_slug, slugify};
use crate::models::{Product, ProductView};
use crate::services::cache::keys;
use crate::state::AppState;

/// Admin input for creating or replacing a product.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ProductInput {
    pub category_id: CategoryId,
    pub name: String,
    pub slug: Option<String>,
    pub sku: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    /// Initial stock on create; ignored on update.
    #[serde(default)]
    pub stock_quantity: i32,
    #[serde(default = "default_low_stock_threshold")]
    pub low_stock_threshold: i32,
    pub image_url: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

const fn default_low_stock_threshold() -> i32 {
    5
}

const fn default_active() -> bool {
    true
}

impl ProductInput {
    /// Validate and normalize into repository fields plus the initial stock.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for the first rule the input breaks.
    pub fn into_fields(self) -> Result<(ProductFields, i32)> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::validation("product name is required"));
        }
        let sku = self.sku.trim().to_uppercase();
        if sku.is_empty() {
            return Err(AppError::validation("sku is required"));
        }
        if self.price <= Decimal::ZERO {
            return Err(AppError::validation("price must be greater than zero"));
        }
        if let Some(compare) = self.compare_at_price
            && compare < self.price
        {
            return Err(AppError::validation(
                "compare_at_price must not be below price",
            ));
        }
        if self.stock_quantity < 0 {
            return Err(AppError::validation("stock_quantity must not be negative"));
        }
        if self.low_stock_threshold < 0 {
            return Err(AppError::validation(
                "low_stock_threshold must not be negative",
            ));
        }
        let slug = match self.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => slug.to_string(),
            _ => slugify(&name),
        };
        if !is_valid_slug(&slug) {
            return Err(AppError::validation(format!("invalid slug: {slug}")));
        }

        let fields = ProductFields {
            category_id: self.category_id,
            name,
            slug,
            sku,
            description: self.description.trim().to_string(),
            price: emporium_core::round_money(self.price),
            compare_at_price: self.compare_at_price.map(emporium_core::round_money),
            low_stock_threshold: self.low_stock_threshold,
            image_url: self.image_url.filter(|u| !u.trim().is_empty()),
            is_active: self.is_active,
        };
        Ok((fields, self.stock_quantity))
    }
}

pub struct ProductService<'a> {
    state: &'a AppState,
}

impl<'a> ProductService<'a> {
    #[must_use]
    pub const fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Active products, newest first, optionally within one category.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if the query fails.
    pub async fn list(
        &self,
        category_id: Option<CategoryId>,
        page: PageRequest,
    ) -> Result<Page<ProductView>> {
        let filter = SearchFilter {
            category_id,
            ..SearchFilter::default()
        };
        let (rows, total) = products::search(self.state.pool(), &filter, page).await?;
        let items = rows
            .into_iter()
            .map(|row| ProductView::new(row.product, row.rating))
            .collect();
        Ok(Page::new(items, page, total))
    }

    /// # Errors
    ///
    /// Returns `AppError::NotFound` unless the product exists and is active.
    pub async fn get(&self, id: ProductId) -> Result<ProductView> {
        let key = keys::product(id);
        if let Some(view) = self.state.cache().get(&key).await {
            return Ok(view);
        }
        let row = products::get(self.state.pool(), id)
            .await?
            .filter(|row| row.product.is_active)
            .ok_or_else(|| AppError::not_found("product not found"))?;
        let view = ProductView::new(row.product, row.rating);
        self.state.cache().set(key, &view).await;
        Ok(view)
    }

    /// Admin read that includes inactive products; bypasses the cache.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown or deleted product.
    pub async fn get_any(&self, id: ProductId) -> Result<ProductView> {
        let row = products::get(self.state.pool(), id)
            .await?
            .ok_or_else(|| AppError::not_found("product not found"))?;
        Ok(ProductView::new(row.product, row.rating))
    }

    /// # Errors
    ///
    /// Returns `AppError::NotFound` unless the product exists and is active.
    pub async fn get_by_slug(&self, slug: &str) -> Result<ProductView> {
        let key = keys::product_slug(slug);
        if let Some(view) = self.state.cache().get(&key).await {
            return Ok(view);
        }
        let row = products::get_by_slug(self.state.pool(), slug)
            .await?
            .filter(|row| row.product.is_active)
            .ok_or_else(|| AppError::not_found("product not found"))?;
        let view = ProductView::new(row.product, row.rating);
        self.state.cache().set(key, &view).await;
        Ok(view)
    }

    /// # Errors
    ///
    /// Returns `AppError::Validation` for bad input or an unknown category,
    /// and a conflict when the slug or SKU is taken.
    #[instrument(skip(self, input), fields(sku = %input.sku))]
    pub async fn create(&self, input: ProductInput) -> Result<Product> {
        let (fields, stock) = input.into_fields()?;
        self.ensure_category(fields.category_id).await?;

        let product = products::create(self.state.pool(), &fields, stock).await?;
        self.invalidate(&product).await;
        tracing::info!(product_id = %product.id, sku = %product.sku, "Product created");
        Ok(product)
    }

    /// Replace a product's fields. Stock is left alone.
    ///
    /// # Errors
    ///
    /// Same as [`ProductService::create`], plus `NotFound`.
    #[instrument(skip(self, input))]
    pub async fn update(&self, id: ProductId, input: ProductInput) -> Result<Product> {
        let (fields, _) = input.into_fields()?;
        self.ensure_category(fields.category_id).await?;

        let before = products::get_plain(self.state.pool(), id)
            .await?
            .ok_or_else(|| AppError::not_found("product not found"))?;
        let product = products::update(self.state.pool(), id, &fields).await?;
        // The old slug key may still hold the previous detail.
        self.invalidate(&before).await;
        self.invalidate(&product).await;
        Ok(product)
    }

    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the product does not exist.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: ProductId) -> Result<()> {
        let product = products::get_plain(self.state.pool(), id)
            .await?
            .ok_or_else(|| AppError::not_found("product not found"))?;
        products::soft_delete(self.state.pool(), id).await?;
        self.invalidate(&product).await;
        tracing::info!(product_id = %id, "Product deleted");
        Ok(())
    }

    async fn ensure_category(&self, id: CategoryId) -> Result<()> {
        if categories::get(self.state.pool(), id).await?.is_none() {
            return Err(AppError::validation("category does not exist"));
        }
        Ok(())
    }

    async fn invalidate(&self, product: &Product) {
        invalidate_product(self.state, product).await;
    }
}

/// Drop every cached read that may include `product`.
pub(crate) async fn invalidate_product(state: &AppState, product: &Product) {
    let cache = state.cache();
    cache.remove(&keys::product(product.id)).await;
    cache.remove(&keys::product_slug(&product.slug)).await;
    cache.remove_by_prefix(keys::SEARCH_PREFIX).await;
}

/// Load an active product or fail with 404.
pub(crate) async fn require_active(
    db: impl db::PgExecutor<'_>,
    id: ProductId,
) -> Result<Product> {
    products::get_plain(db, id)
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(|| AppError::not_found("product not found"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::product::tests::dec;

    fn input() -> ProductInput {
        ProductInput {
            category_id: CategoryId::generate(),
            name: "Pour Over Kettle".to_string(),
            slug: None,
            sku: " kt-100 ".to_string(),
            description: String::new(),
            price: dec("49.999"),
            compare_at_price: Some(dec("59.90")),
            stock_quantity: 12,
            low_stock_threshold: 3,
            image_url: Some(String::new()),
            is_active: true,
        }
    }

    #[test]
    fn test_into_fields_normalizes() {
        let (fields, stock) = input().into_fields().unwrap();
        assert_eq!(fields.slug, "pour-over-kettle");
        assert_eq!(fields.sku, "KT-100");
        assert_eq!(fields.price, dec("50.00"));
        assert_eq!(fields.image_url, None);
        assert_eq!(stock, 12);
    }

    #[test]
    fn test_price_must_be_positive() {
        let mut bad = input();
        bad.price = Decimal::ZERO;
        bad.compare_at_price = None;
        assert!(matches!(bad.into_fields(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_compare_at_price_not_below_price() {
        let mut bad = input();
        bad.compare_at_price = Some(dec("10.00"));
        assert!(matches!(bad.into_fields(), Err(AppError::Validation(_))));

        let mut equal = input();
        equal.price = dec("59.90");
        assert!(equal.into_fields().is_ok());
    }

    #[test]
    fn test_negative_stock_rejected() {
        let mut bad = input();
        bad.stock_quantity = -1;
        assert!(matches!(bad.into_fields(), Err(AppError::Validation(_))));
    }
}
