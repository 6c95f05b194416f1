//! Shopping carts.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use emporium_core::{CartId, CartItemId, CategoryId, ProductId, UserId, round_money};

use super::coupon::CouponLine;

/// Largest quantity a single cart line may hold.
pub const MAX_LINE_QUANTITY: i32 = 99;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
    pub coupon_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A cart item joined with the live product row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CartLine {
    pub item_id: CartItemId,
    pub product_id: ProductId,
    pub category_id: CategoryId,
    pub product_name: String,
    pub product_slug: String,
    pub sku: String,
    pub image_url: Option<String>,
    /// Price when the item was added.
    pub added_price: Decimal,
    /// Current product price; used for every total.
    pub unit_price: Decimal,
    pub quantity: i32,
    pub stock_quantity: i32,
    pub is_active: bool,
}

impl CartLine {
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        round_money(self.unit_price * Decimal::from(self.quantity))
    }

    #[must_use]
    pub fn price_changed(&self) -> bool {
        self.added_price != self.unit_price
    }

    /// Whether the product can still be bought in this quantity.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.is_active && self.stock_quantity >= self.quantity
    }

    #[must_use]
    pub fn coupon_line(&self) -> CouponLine {
        CouponLine {
            category_id: self.category_id,
            line_total: self.line_total(),
        }
    }
}

/// Rejected cart line quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityError {
    OutOfRange,
    InsufficientStock,
}

/// Check a requested line quantity against the per-line cap and stock.
///
/// # Errors
///
/// Returns [`QuantityError`] for quantities outside `1..=99` or above stock.
pub const fn check_line_quantity(quantity: i32, stock: i32) -> Result<(), QuantityError> {
    if quantity < 1 || quantity > MAX_LINE_QUANTITY {
        return Err(QuantityError::OutOfRange);
    }
    if quantity > stock {
        return Err(QuantityError::InsufficientStock);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct CartLineView {
    #[serde(flatten)]
    pub line: CartLine,
    pub line_total: Decimal,
    pub price_changed: bool,
    pub available: bool,
}

/// A cart as returned by the API, with previewed totals.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub id: CartId,
    pub items: Vec<CartLineView>,
    pub item_count: i32,
    pub subtotal: Decimal,
    pub coupon_code: Option<String>,
    pub discount: Decimal,
    /// Set when the stored coupon no longer validates.
    pub coupon_error: Option<String>,
    pub shipping_estimate: Decimal,
    pub total: Decimal,
}

impl CartView {
    #[must_use]
    pub fn new(cart: &Cart, lines: Vec<CartLine>) -> Self {
        let subtotal = lines.iter().map(CartLine::line_total).sum();
        let item_count = lines.iter().map(|l| l.quantity).sum();
        let items = lines
            .into_iter()
            .map(|line| CartLineView {
                line_total: line.line_total(),
                price_changed: line.price_changed(),
                available: line.is_available(),
                line,
            })
            .collect();

        Self {
            id: cart.id,
            items,
            item_count,
            subtotal,
            coupon_code: cart.coupon_code.clone(),
            discount: Decimal::ZERO,
            coupon_error: None,
            shipping_estimate: Decimal::ZERO,
            total: subtotal,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn line(price: &str, quantity: i32) -> CartLine {
        CartLine {
            item_id: CartItemId::generate(),
            product_id: ProductId::generate(),
            category_id: CategoryId::generate(),
            product_name: "Tea Kettle".to_string(),
            product_slug: "tea-kettle".to_string(),
            sku: "TK-1".to_string(),
            image_url: None,
            added_price: dec(price),
            unit_price: dec(price),
            quantity,
            stock_quantity: 10,
            is_active: true,
        }
    }

    #[test]
    fn test_line_total() {
        assert_eq!(line("19.99", 3).line_total(), dec("59.97"));
    }

    #[test]
    fn test_view_sums_items() {
        let cart = Cart {
            id: CartId::generate(),
            user_id: UserId::generate(),
            coupon_code: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let view = CartView::new(&cart, vec![line("10.00", 2), line("5.50", 1)]);
        assert_eq!(view.item_count, 3);
        assert_eq!(view.subtotal, dec("25.50"));
        assert_eq!(view.total, dec("25.50"));
    }

    #[test]
    fn test_price_changed_and_availability() {
        let mut l = line("10.00", 2);
        assert!(!l.price_changed());
        l.unit_price = dec("8.00");
        assert!(l.price_changed());
        l.stock_quantity = 1;
        assert!(!l.is_available());
    }

    #[test]
    fn test_check_line_quantity() {
        assert!(check_line_quantity(1, 5).is_ok());
        assert_eq!(check_line_quantity(0, 5), Err(QuantityError::OutOfRange));
        assert_eq!(check_line_quantity(100, 500), Err(QuantityError::OutOfRange));
        assert_eq!(check_line_quantity(6, 5), Err(QuantityError::InsufficientStock));
    }
}
