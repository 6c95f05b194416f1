//! Products and their rating summary.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use emporium_core::{CategoryId, ProductId};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: ProductId,
    pub category_id: CategoryId,
    pub name: String,
    pub slug: String,
    pub sku: String,
    pub description: String,
    pub price: Decimal,
    /// Previous price shown struck through; only meaningful when above `price`.
    pub compare_at_price: Option<Decimal>,
    pub stock_quantity: i32,
    pub low_stock_threshold: i32,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[must_use]
    pub const fn is_in_stock(&self) -> bool {
        self.stock_quantity > 0
    }

    /// At or below the low-stock threshold, including sold out.
    #[must_use]
    pub const fn is_low_stock(&self) -> bool {
        self.stock_quantity <= self.low_stock_threshold
    }

    /// Active and enough stock for `quantity` units.
    #[must_use]
    pub const fn can_fulfil(&self, quantity: i32) -> bool {
        self.is_active && quantity > 0 && self.stock_quantity >= quantity
    }

    /// Whole-percent discount against `compare_at_price`, if any.
    #[must_use]
    pub fn discount_percent(&self) -> Option<Decimal> {
        let compare = self.compare_at_price?;
        if compare <= self.price || compare.is_zero() {
            return None;
        }
        Some(((compare - self.price) / compare * Decimal::ONE_HUNDRED).round())
    }
}

/// Aggregate over approved reviews.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RatingSummary {
    /// Mean rating to one decimal place; `None` without reviews.
    pub average: Option<Decimal>,
    pub count: i64,
}

/// A product as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub in_stock: bool,
    pub low_stock: bool,
    pub discount_percent: Option<Decimal>,
    pub rating: RatingSummary,
}

impl ProductView {
    #[must_use]
    pub fn new(product: Product, rating: RatingSummary) -> Self {
        Self {
            in_stock: product.is_in_stock(),
            low_stock: product.is_low_stock(),
            discount_percent: product.discount_percent(),
            product,
            rating,
        }
    }
}

/// Sort orders accepted by product listing and search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    /// Name matches first; falls back to newest without a text query.
    Relevance,
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Name,
    Rating,
}

impl ProductSort {
    /// SQL `ORDER BY` clause. Assumes `p` aliases `products` and `r` the rating join.
    #[must_use]
    pub const fn order_by(self) -> &'static str {
        match self {
            Self::Relevance | Self::Newest => "p.created_at DESC, p.id",
            Self::PriceAsc => "p.price ASC, p.id",
            Self::PriceDesc => "p.price DESC, p.id",
            Self::Name => "p.name ASC, p.id",
            Self::Rating => "r.average DESC NULLS LAST, p.id",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    pub(crate) fn product(price: &str, stock: i32) -> Product {
        Product {
            id: ProductId::generate(),
            category_id: CategoryId::generate(),
            name: "Espresso Machine".to_string(),
            slug: "espresso-machine".to_string(),
            sku: "ESP-001".to_string(),
            description: String::new(),
            price: dec(price),
            compare_at_price: None,
            stock_quantity: stock,
            low_stock_threshold: 5,
            image_url: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_stock_flags() {
        assert!(!product("10", 0).is_in_stock());
        assert!(product("10", 0).is_low_stock());
        assert!(product("10", 5).is_low_stock());
        assert!(!product("10", 6).is_low_stock());
    }

    #[test]
    fn test_can_fulfil() {
        let mut p = product("10", 3);
        assert!(p.can_fulfil(3));
        assert!(!p.can_fulfil(4));
        assert!(!p.can_fulfil(0));
        p.is_active = false;
        assert!(!p.can_fulfil(1));
    }

    #[test]
    fn test_discount_percent() {
        let mut p = product("75.00", 1);
        assert_eq!(p.discount_percent(), None);
        p.compare_at_price = Some(dec("100.00"));
        assert_eq!(p.discount_percent(), Some(dec("25")));
        p.compare_at_price = Some(dec("50.00"));
        assert_eq!(p.discount_percent(), None);
    }
}
