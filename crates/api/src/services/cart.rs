//! Shopping cart operations and the priced cart view.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::instrument;

use emporium_core::{CartItemId, ProductId, UserId};

use crate::db::{carts, coupons};
use crate::error::{AppError, Result};
use crate::models::cart::{QuantityError, check_line_quantity, MAX_LINE_QUANTITY};
use crate::models::coupon::normalize_code;
use crate::models::order::ShippingRule;
use crate::models::{CartLine, CartView, CouponLine, OrderTotals};
use crate::services::coupon::{self, AppliedCoupon};
use crate::services::product::require_active;
use crate::state::AppState;

/// Result of re-checking the stored coupon code.
#[derive(Debug)]
pub enum CouponPreview {
    None,
    Applied(AppliedCoupon),
    Rejected(AppError),
}

/// Fill the discount, shipping estimate and total of a freshly built view.
#[must_use]
pub fn price_view(mut view: CartView, preview: CouponPreview, rule: ShippingRule) -> CartView {
    if view.items.is_empty() {
        return view;
    }

    let (discount, free_shipping) = match preview {
        CouponPreview::None => (Decimal::ZERO, false),
        CouponPreview::Applied(applied) => (applied.discount, applied.coupon.is_free_shipping()),
        CouponPreview::Rejected(err) => {
            view.coupon_error = Some(err.code().to_string());
            (Decimal::ZERO, false)
        }
    };

    let totals = OrderTotals::compute(view.subtotal, discount, free_shipping, rule);
    view.discount = totals.discount;
    view.shipping_estimate = totals.shipping;
    view.total = totals.total;
    view
}

/// Map a line quantity failure to the API error.
pub(crate) fn quantity_error(err: QuantityError, available: i32) -> AppError {
    match err {
        QuantityError::OutOfRange => AppError::validation(format!(
            "quantity must be between 1 and {MAX_LINE_QUANTITY}"
        )),
        QuantityError::InsufficientStock => AppError::rule(
            "INSUFFICIENT_STOCK",
            format!("only {available} in stock"),
        ),
    }
}

pub struct CartService<'a> {
    state: &'a AppState,
}

impl<'a> CartService<'a> {
    #[must_use]
    pub const fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// The user's cart with previewed totals, created on first access.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if a query fails.
    pub async fn get(&self, user_id: UserId) -> Result<CartView> {
        let pool = self.state.pool();
        let cart = carts::get_or_create(pool, user_id).await?;
        let lines = carts::lines(pool, cart.id).await?;

        let preview = match cart.coupon_code.as_deref() {
            Some(code) if !lines.is_empty() => self.preview_coupon(user_id, code, &lines).await?,
            _ => CouponPreview::None,
        };

        Ok(price_view(
            CartView::new(&cart, lines),
            preview,
            self.state.shipping_rule(),
        ))
    }

    /// Add `quantity` of a product, merging with an existing line.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown or inactive product and
    /// `INSUFFICIENT_STOCK` when the merged quantity exceeds stock.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<CartView> {
        if !(1..=MAX_LINE_QUANTITY).contains(&quantity) {
            return Err(quantity_error(QuantityError::OutOfRange, 0));
        }
        let pool = self.state.pool();
        let product = require_active(pool, product_id).await?;
        if !product.is_in_stock() {
            return Err(AppError::rule(
                "INSUFFICIENT_STOCK",
                format!("{} is out of stock", product.name),
            ));
        }

        let cart = carts::get_or_create(pool, user_id).await?;
        let existing = carts::quantity_of(pool, cart.id, product_id).await?.unwrap_or(0);
        let merged = existing.saturating_add(quantity);
        check_line_quantity(merged, product.stock_quantity)
            .map_err(|e| quantity_error(e, product.stock_quantity))?;

        carts::upsert_item(pool, cart.id, product_id, merged, product.price).await?;
        tracing::debug!(cart_id = %cart.id, quantity = merged, "Cart line saved");
        self.get(user_id).await
    }

    /// Set a line's quantity; zero removes it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the line is not in the user's cart.
    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: UserId,
        item_id: CartItemId,
        quantity: i32,
    ) -> Result<CartView> {
        if quantity == 0 {
            return self.remove_item(user_id, item_id).await;
        }
        let pool = self.state.pool();
        let cart = carts::get_or_create(pool, user_id).await?;
        let line = carts::line(pool, cart.id, item_id)
            .await?
            .ok_or_else(|| AppError::not_found("cart item not found"))?;
        if !line.is_active {
            return Err(AppError::not_found("product not found"));
        }
        check_line_quantity(quantity, line.stock_quantity)
            .map_err(|e| quantity_error(e, line.stock_quantity))?;

        carts::set_quantity(pool, cart.id, item_id, quantity).await?;
        self.get(user_id).await
    }

    /// # Errors
    ///
    /// Returns `AppError::Database` (not found) if the line is not in the cart.
    pub async fn remove_item(&self, user_id: UserId, item_id: CartItemId) -> Result<CartView> {
        let cart = carts::get_or_create(self.state.pool(), user_id).await?;
        carts::remove_item(self.state.pool(), cart.id, item_id).await?;
        self.get(user_id).await
    }

    /// Empty the cart and drop its coupon.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if a query fails.
    pub async fn clear(&self, user_id: UserId) -> Result<CartView> {
        let cart = carts::get_or_create(self.state.pool(), user_id).await?;
        carts::clear(self.state.pool(), cart.id).await?;
        self.get(user_id).await
    }

    /// Validate a code against the current cart and store it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Coupon` with the failing rule, or
    /// `AppError::Validation` for an empty cart.
    #[instrument(skip(self))]
    pub async fn apply_coupon(&self, user_id: UserId, code: &str) -> Result<CartView> {
        let pool = self.state.pool();
        let cart = carts::get_or_create(pool, user_id).await?;
        let lines = carts::lines(pool, cart.id).await?;
        if lines.is_empty() {
            return Err(AppError::validation("cannot apply a coupon to an empty cart"));
        }

        let code = normalize_code(code);
        let coupon = coupons::get_by_code(pool, &code).await?;
        let coupon_lines: Vec<CouponLine> = lines.iter().map(CartLine::coupon_line).collect();
        coupon::evaluate(
            pool,
            coupon,
            user_id,
            &coupon_lines,
            self.state.shipping_rule(),
            Utc::now(),
        )
        .await?;

        carts::set_coupon(pool, cart.id, Some(&code)).await?;
        tracing::info!(cart_id = %cart.id, code = %code, "Coupon applied to cart");
        self.get(user_id).await
    }

    /// # Errors
    ///
    /// Returns `AppError::Database` if a query fails.
    pub async fn remove_coupon(&self, user_id: UserId) -> Result<CartView> {
        let cart = carts::get_or_create(self.state.pool(), user_id).await?;
        carts::set_coupon(self.state.pool(), cart.id, None).await?;
        self.get(user_id).await
    }

    async fn preview_coupon(
        &self,
        user_id: UserId,
        code: &str,
        lines: &[CartLine],
    ) -> Result<CouponPreview> {
        let pool = self.state.pool();
        let coupon = coupons::get_by_code(pool, code).await?;
        let coupon_lines: Vec<CouponLine> = lines.iter().map(CartLine::coupon_line).collect();
        match coupon::evaluate(
            pool,
            coupon,
            user_id,
            &coupon_lines,
            self.state.shipping_rule(),
            Utc::now(),
        )
        .await
        {
            Ok(applied) => Ok(CouponPreview::Applied(applied)),
            Err(err @ AppError::Coupon(_)) => Ok(CouponPreview::Rejected(err)),
            Err(other) => Err(other),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use emporium_core::{CartId, CategoryId, CouponId, DiscountType};

    use super::*;
    use crate::models::{Cart, Coupon, CouponRejection};

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn rule() -> ShippingRule {
        ShippingRule {
            flat_rate: dec("29.90"),
            free_threshold: dec("500.00"),
        }
    }

    fn cart() -> Cart {
        Cart {
            id: CartId::generate(),
            user_id: UserId::generate(),
            coupon_code: Some("SAVE10".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn line(price: &str, quantity: i32) -> CartLine {
        CartLine {
            item_id: CartItemId::generate(),
            product_id: ProductId::generate(),
            category_id: CategoryId::generate(),
            product_name: "Ceramic Mug".to_string(),
            product_slug: "ceramic-mug".to_string(),
            sku: "MUG-1".to_string(),
            image_url: None,
            added_price: dec(price),
            unit_price: dec(price),
            quantity,
            stock_quantity: 50,
            is_active: true,
        }
    }

    fn applied(discount_type: DiscountType, discount: &str) -> CouponPreview {
        let now = Utc::now();
        CouponPreview::Applied(AppliedCoupon {
            coupon: Coupon {
                id: CouponId::generate(),
                code: "SAVE10".to_string(),
                description: None,
                discount_type,
                discount_value: dec("10"),
                minimum_order_amount: None,
                maximum_discount_amount: None,
                usage_limit: None,
                usage_limit_per_user: None,
                used_count: 0,
                applicable_category_ids: Vec::new(),
                starts_at: now - Duration::days(1),
                expires_at: now + Duration::days(1),
                is_active: true,
                created_at: now,
                updated_at: now,
            },
            discount: dec(discount),
        })
    }

    #[test]
    fn test_price_view_without_coupon() {
        let view = CartView::new(&cart(), vec![line("20.00", 2)]);
        let view = price_view(view, CouponPreview::None, rule());
        assert_eq!(view.subtotal, dec("40.00"));
        assert_eq!(view.shipping_estimate, dec("29.90"));
        assert_eq!(view.total, dec("69.90"));
        assert_eq!(view.coupon_error, None);
    }

    #[test]
    fn test_price_view_with_discount() {
        let view = CartView::new(&cart(), vec![line("300.00", 2)]);
        let view = price_view(view, applied(DiscountType::Percentage, "60.00"), rule());
        assert_eq!(view.discount, dec("60.00"));
        assert_eq!(view.shipping_estimate, Decimal::ZERO);
        assert_eq!(view.total, dec("540.00"));
    }

    #[test]
    fn test_discount_can_push_below_free_threshold() {
        let view = CartView::new(&cart(), vec![line("510.00", 1)]);
        let view = price_view(view, applied(DiscountType::FixedAmount, "20.00"), rule());
        assert_eq!(view.shipping_estimate, dec("29.90"));
        assert_eq!(view.total, dec("519.90"));
    }

    #[test]
    fn test_free_shipping_preview() {
        let view = CartView::new(&cart(), vec![line("15.00", 1)]);
        let view = price_view(view, applied(DiscountType::FreeShipping, "29.90"), rule());
        assert_eq!(view.discount, dec("29.90"));
        assert_eq!(view.shipping_estimate, Decimal::ZERO);
        assert_eq!(view.total, dec("15.00"));
    }

    #[test]
    fn test_rejected_coupon_reported() {
        let view = CartView::new(&cart(), vec![line("15.00", 1)]);
        let preview = CouponPreview::Rejected(AppError::Coupon(CouponRejection::Expired));
        let view = price_view(view, preview, rule());
        assert_eq!(view.coupon_error.as_deref(), Some("COUPON_EXPIRED"));
        assert_eq!(view.discount, Decimal::ZERO);
        assert_eq!(view.total, dec("44.90"));
    }

    #[test]
    fn test_empty_cart_has_no_shipping() {
        let view = price_view(CartView::new(&cart(), Vec::new()), CouponPreview::None, rule());
        assert_eq!(view.shipping_estimate, Decimal::ZERO);
        assert_eq!(view.total, Decimal::ZERO);
    }

    #[test]
    fn test_quantity_error_codes() {
        assert_eq!(quantity_error(QuantityError::OutOfRange, 3).code(), "VALIDATION_ERROR");
        let err = quantity_error(QuantityError::InsufficientStock, 3);
        assert_eq!(err.code(), "INSUFFICIENT_STOCK");
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
