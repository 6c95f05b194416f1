//! Checkout and the order lifecycle.

use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use emporium_core::{
    MovementType, NotificationKind, OrderId, OrderStatus, Page, PageRequest, PaymentMethod,
    ProductId, UserId, round_money,
};

use crate::db::inventory::NewMovement;
use crate::db::orders::{NewOrder, NewOrderItem};
use crate::db::{UnitOfWork, carts, coupons, inventory, orders, products, users};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::models::inventory::apply_stock_change;
use crate::models::order::{OrderDetail, generate_order_number};
use crate::models::{
    CartLine, CouponLine, NewNotification, Order, OrderItem, OrderTotals, Product, ShippingAddress,
};
use crate::services::coupon;
use crate::services::notification::notify_quietly;
use crate::services::product::invalidate_product;
use crate::state::AppState;

/// Longest accepted order note.
const MAX_NOTES_CHARS: usize = 1000;

/// Body of `POST /api/orders`.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrder {
    pub shipping_address: ShippingAddress,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
}

impl PlaceOrder {
    fn validated(self) -> Result<(ShippingAddress, PaymentMethod, Option<String>)> {
        let shipping = self.shipping_address.normalized();
        if let Some(field) = shipping.missing_field() {
            return Err(AppError::validation(format!(
                "shipping_address.{field} is required"
            )));
        }
        let notes = self
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        if notes
            .as_ref()
            .is_some_and(|n| n.chars().count() > MAX_NOTES_CHARS)
        {
            return Err(AppError::validation(format!(
                "notes must be at most {MAX_NOTES_CHARS} characters"
            )));
        }
        Ok((shipping, self.payment_method, notes))
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StatusUpdate {
    pub status: OrderStatus,
}

/// Build item snapshots from cart lines against the locked product rows.
///
/// Prices come from the locked rows, not the cart.
///
/// # Errors
///
/// Returns `INSUFFICIENT_STOCK` when a product is gone, inactive or short.
pub fn snapshot_items(lines: &[CartLine], locked: &[Product]) -> Result<Vec<NewOrderItem>> {
    let by_id: HashMap<ProductId, &Product> = locked.iter().map(|p| (p.id, p)).collect();
    lines
        .iter()
        .map(|line| {
            let product = by_id
                .get(&line.product_id)
                .filter(|p| p.can_fulfil(line.quantity))
                .ok_or_else(|| {
                    AppError::rule(
                        "INSUFFICIENT_STOCK",
                        format!("{} is no longer available in this quantity", line.product_name),
                    )
                })?;
            let line_total = round_money(product.price * Decimal::from(line.quantity));
            Ok(NewOrderItem {
                product_id: product.id,
                product_name: product.name.clone(),
                sku: product.sku.clone(),
                unit_price: product.price,
                quantity: line.quantity,
                line_total,
            })
        })
        .collect()
}

/// Put every item's quantity back on the shelf with a `return` movement.
async fn restock_items(uow: &mut UnitOfWork, order_id: OrderId, items: &[OrderItem]) -> Result<()> {
    let ids: Vec<ProductId> = items.iter().map(|i| i.product_id).collect();
    let locked = products::lock_for_update(uow.conn(), &ids).await?;
    let mut stock: HashMap<ProductId, i32> =
        locked.iter().map(|p| (p.id, p.stock_quantity)).collect();

    for item in items {
        // Products deleted since the order was placed have nowhere to go.
        let Some(current) = stock.get_mut(&item.product_id) else {
            continue;
        };
        let after = apply_stock_change(*current, item.quantity)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        products::set_stock(uow.conn(), item.product_id, after).await?;
        inventory::record(
            uow.conn(),
            &NewMovement {
                product_id: item.product_id,
                movement_type: MovementType::Return,
                quantity_change: item.quantity,
                quantity_after: after,
                reason: Some("order cancelled"),
                reference_id: Some(order_id.as_uuid()),
            },
        )
        .await?;
        *current = after;
    }
    Ok(())
}

/// Notify and email the customer about a status change. Never fails.
pub(crate) async fn announce_status_change(state: &AppState, order: &Order, previous: OrderStatus) {
    let pool = state.pool();
    notify_quietly(
        pool,
        &NewNotification::new(
            order.user_id,
            NotificationKind::OrderStatus,
            format!("Order {} {}", order.order_number, order.status),
            format!(
                "Your order {} moved from {previous} to {}.",
                order.order_number, order.status
            ),
        )
        .with_reference(order.id),
    )
    .await;

    match users::get_by_id(pool, order.user_id).await {
        Ok(Some(user)) => {
            if let Err(e) = state
                .email()
                .send_order_status(pool, &user, &order.order_number, previous, order.status)
                .await
            {
                tracing::warn!(order_id = %order.id, error = %e, "Failed to send status email");
            }
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(order_id = %order.id, error = %e, "Failed to load order owner"),
    }
}

pub struct OrderService<'a> {
    state: &'a AppState,
}

impl<'a> OrderService<'a> {
    #[must_use]
    pub const fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Turn the user's cart into an order in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for an empty cart or bad address,
    /// `INSUFFICIENT_STOCK` when a line can no longer be fulfilled and
    /// `AppError::Coupon` when the stored coupon no longer applies.
    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn place_order(&self, user_id: UserId, request: PlaceOrder) -> Result<OrderDetail> {
        let (shipping, payment_method, notes) = request.validated()?;
        let now = Utc::now();
        let rule = self.state.shipping_rule();

        let mut uow = UnitOfWork::begin(self.state.pool()).await?;
        let cart = carts::get_or_create(uow.conn(), user_id).await?;
        let lines = carts::lines(uow.conn(), cart.id).await?;
        if lines.is_empty() {
            return Err(AppError::validation("cart is empty"));
        }

        let ids: Vec<ProductId> = lines.iter().map(|l| l.product_id).collect();
        let locked = products::lock_for_update(uow.conn(), &ids).await?;
        let items = snapshot_items(&lines, &locked)?;
        let subtotal: Decimal = items.iter().map(|i| i.line_total).sum();

        let applied = match cart.coupon_code.as_deref() {
            Some(code) => {
                let coupon_lines: Vec<_> = lines
                    .iter()
                    .zip(&items)
                    .map(|(line, item)| CouponLine {
                        category_id: line.category_id,
                        line_total: item.line_total,
                    })
                    .collect();
                let locked_coupon = coupons::lock_by_code(uow.conn(), code).await?;
                Some(
                    coupon::evaluate(uow.conn(), locked_coupon, user_id, &coupon_lines, rule, now)
                        .await?,
                )
            }
            None => None,
        };

        let (discount, free_shipping) = applied
            .as_ref()
            .map_or((Decimal::ZERO, false), |a| {
                (a.discount, a.coupon.is_free_shipping())
            });
        let totals = OrderTotals::compute(subtotal, discount, free_shipping, rule);
        let order_number = generate_order_number(now, &mut rand::rng());

        let order = orders::create(
            uow.conn(),
            &NewOrder {
                order_number: &order_number,
                user_id,
                totals,
                coupon_code: applied.as_ref().map(|a| a.coupon.code.as_str()),
                payment_method,
                shipping: &shipping,
                notes: notes.as_deref(),
            },
        )
        .await?;
        let order_items = orders::insert_items(uow.conn(), order.id, &items).await?;

        let stock: HashMap<ProductId, i32> =
            locked.iter().map(|p| (p.id, p.stock_quantity)).collect();
        for item in &items {
            let current = stock.get(&item.product_id).copied().unwrap_or(0);
            let after = apply_stock_change(current, -item.quantity).map_err(|_| {
                AppError::rule(
                    "INSUFFICIENT_STOCK",
                    format!("{} is no longer available in this quantity", item.product_name),
                )
            })?;
            products::set_stock(uow.conn(), item.product_id, after).await?;
            inventory::record(
                uow.conn(),
                &NewMovement {
                    product_id: item.product_id,
                    movement_type: MovementType::Sale,
                    quantity_change: -item.quantity,
                    quantity_after: after,
                    reason: Some("order placed"),
                    reference_id: Some(order.id.as_uuid()),
                },
            )
            .await?;
        }

        if let Some(applied) = &applied {
            coupons::record_usage(uow.conn(), applied.coupon.id, user_id, order.id, totals.discount)
                .await?;
        }
        carts::clear(uow.conn(), cart.id).await?;
        uow.commit().await?;

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total,
            "Order placed"
        );
        add_breadcrumb(
            "order",
            "Placed order",
            Some(&[("order_number", order.order_number.as_str())]),
        );

        for item in &items {
            self.invalidate_product(item.product_id).await;
        }

        let detail = OrderDetail {
            order,
            items: order_items,
        };
        self.after_placement(&detail).await;
        Ok(detail)
    }

    async fn after_placement(&self, detail: &OrderDetail) {
        let pool = self.state.pool();
        let order = &detail.order;
        notify_quietly(
            pool,
            &NewNotification::new(
                order.user_id,
                NotificationKind::OrderStatus,
                format!("Order {} received", order.order_number),
                format!("We received your order {}.", order.order_number),
            )
            .with_reference(order.id),
        )
        .await;

        match users::get_by_id(pool, order.user_id).await {
            Ok(Some(user)) => {
                if let Err(e) = self.state.email().send_order_confirmation(pool, &user, detail).await {
                    tracing::warn!(order_id = %order.id, error = %e, "Failed to send confirmation email");
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(order_id = %order.id, error = %e, "Failed to load order owner"),
        }
    }

    async fn invalidate_product(&self, id: ProductId) {
        match products::get_plain(self.state.pool(), id).await {
            Ok(Some(product)) => invalidate_product(self.state, &product).await,
            Ok(None) => {}
            Err(e) => tracing::warn!(product_id = %id, error = %e, "Failed to reload product for cache"),
        }
    }

    /// # Errors
    ///
    /// Returns `AppError::Database` if a query fails.
    pub async fn list_mine(&self, user_id: UserId, page: PageRequest) -> Result<Page<Order>> {
        let (items, total) = orders::list_for_user(self.state.pool(), user_id, page).await?;
        Ok(Page::new(items, page, total))
    }

    /// # Errors
    ///
    /// Returns `AppError::NotFound` unless the order belongs to the user.
    pub async fn get_mine(&self, user_id: UserId, id: OrderId) -> Result<OrderDetail> {
        let detail = self.get(id).await?;
        if detail.order.user_id != user_id {
            return Err(AppError::not_found("order not found"));
        }
        Ok(detail)
    }

    /// # Errors
    ///
    /// Returns `AppError::Database` if a query fails.
    pub async fn list_all(
        &self,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> Result<Page<Order>> {
        let (items, total) = orders::list_all(self.state.pool(), status, page).await?;
        Ok(Page::new(items, page, total))
    }

    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown order.
    pub async fn get(&self, id: OrderId) -> Result<OrderDetail> {
        let pool = self.state.pool();
        let order = orders::get(pool, id)
            .await?
            .ok_or_else(|| AppError::not_found("order not found"))?;
        let items = orders::items(pool, id).await?;
        Ok(OrderDetail { order, items })
    }

    /// Move an order along its lifecycle. Cancelling restocks the items.
    ///
    /// # Errors
    ///
    /// Returns `INVALID_STATUS_TRANSITION` for a move the lifecycle forbids.
    #[instrument(skip(self))]
    pub async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<Order> {
        let mut uow = UnitOfWork::begin(self.state.pool()).await?;
        let current = orders::lock(uow.conn(), id)
            .await?
            .ok_or_else(|| AppError::not_found("order not found"))?;
        let previous = current.status;
        if !previous.can_transition_to(status) {
            return Err(invalid_transition(previous, status));
        }

        let order = orders::set_status(uow.conn(), id, status).await?;
        let restocked = if status == OrderStatus::Cancelled {
            let items = orders::items(uow.conn(), id).await?;
            restock_items(&mut uow, id, &items).await?;
            items
        } else {
            Vec::new()
        };
        uow.commit().await?;

        tracing::info!(order_id = %id, from = %previous, to = %status, "Order status changed");
        for item in &restocked {
            self.invalidate_product(item.product_id).await;
        }
        announce_status_change(self.state, &order, previous).await;
        Ok(order)
    }

    /// Customer cancellation, allowed while pending or confirmed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` unless the order belongs to the user and
    /// `ORDER_NOT_CANCELLABLE` once it is being processed.
    #[instrument(skip(self))]
    pub async fn cancel_mine(&self, user_id: UserId, id: OrderId) -> Result<Order> {
        let mut uow = UnitOfWork::begin(self.state.pool()).await?;
        let current = orders::lock(uow.conn(), id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| AppError::not_found("order not found"))?;
        if !current.status.is_customer_cancellable() {
            return Err(AppError::conflict(
                "ORDER_NOT_CANCELLABLE",
                format!("an order that is {} can no longer be cancelled", current.status),
            ));
        }

        let order = orders::set_status(uow.conn(), id, OrderStatus::Cancelled).await?;
        let items = orders::items(uow.conn(), id).await?;
        restock_items(&mut uow, id, &items).await?;
        uow.commit().await?;

        tracing::info!(order_id = %id, "Order cancelled by customer");
        for item in &items {
            self.invalidate_product(item.product_id).await;
        }
        announce_status_change(self.state, &order, current.status).await;
        Ok(order)
    }
}

pub(crate) fn invalid_transition(from: OrderStatus, to: OrderStatus) -> AppError {
    AppError::conflict(
        "INVALID_STATUS_TRANSITION",
        format!("cannot move an order from {from} to {to}"),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use emporium_core::CartItemId;

    use super::*;
    use crate::models::product::tests::{dec, product};

    fn line_for(p: &Product, quantity: i32) -> CartLine {
        CartLine {
            item_id: CartItemId::generate(),
            product_id: p.id,
            category_id: p.category_id,
            product_name: p.name.clone(),
            product_slug: p.slug.clone(),
            sku: p.sku.clone(),
            image_url: None,
            added_price: dec("1.00"),
            unit_price: p.price,
            quantity,
            stock_quantity: p.stock_quantity,
            is_active: p.is_active,
        }
    }

    fn address() -> ShippingAddress {
        ShippingAddress {
            name: "Ada Lovelace".to_string(),
            phone: "555-0100".to_string(),
            line1: "1 Analytical Way".to_string(),
            line2: None,
            city: "London".to_string(),
            postal_code: "N1 9GU".to_string(),
            country: "GB".to_string(),
        }
    }

    #[test]
    fn test_snapshot_uses_locked_price() {
        let p = product("12.50", 4);
        let items = snapshot_items(&[line_for(&p, 3)], std::slice::from_ref(&p)).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].unit_price, dec("12.50"));
        assert_eq!(items[0].line_total, dec("37.50"));
    }

    #[test]
    fn test_snapshot_rejects_short_stock() {
        let p = product("9.99", 2);
        let err = snapshot_items(&[line_for(&p, 3)], std::slice::from_ref(&p)).unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_STOCK");
    }

    #[test]
    fn test_snapshot_rejects_inactive_or_missing() {
        let mut p = product("9.99", 5);
        p.is_active = false;
        assert!(snapshot_items(&[line_for(&p, 1)], std::slice::from_ref(&p)).is_err());

        let gone = product("9.99", 5);
        assert!(snapshot_items(&[line_for(&gone, 1)], &[]).is_err());
    }

    #[test]
    fn test_place_order_validation() {
        let request = PlaceOrder {
            shipping_address: ShippingAddress {
                city: "  ".to_string(),
                ..address()
            },
            payment_method: PaymentMethod::CreditCard,
            notes: None,
        };
        let err = request.validated().unwrap_err();
        assert!(err.to_string().contains("shipping_address.city"));

        let request = PlaceOrder {
            shipping_address: address(),
            payment_method: PaymentMethod::BankTransfer,
            notes: Some("   ".to_string()),
        };
        let (_, method, notes) = request.validated().unwrap();
        assert_eq!(method, PaymentMethod::BankTransfer);
        assert_eq!(notes, None);
    }

    #[test]
    fn test_place_order_defaults_payment_method() {
        let request: PlaceOrder = serde_json::from_value(serde_json::json!({
            "shipping_address": {
                "name": "Ada", "phone": "1", "line1": "x", "city": "y",
                "postal_code": "z", "country": "GB"
            }
        }))
        .unwrap();
        assert_eq!(request.payment_method, PaymentMethod::CreditCard);
    }

    #[test]
    fn test_invalid_transition_code() {
        let err = invalid_transition(OrderStatus::Delivered, OrderStatus::Pending);
        assert_eq!(err.code(), "INVALID_STATUS_TRANSITION");
        assert_eq!(err.status(), axum::http::StatusCode::CONFLICT);
    }
}
