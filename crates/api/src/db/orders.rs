//! Orders and order items.

use rust_decimal::Decimal;

use emporium_core::{OrderId, OrderItemId, OrderStatus, PageRequest, PaymentMethod, ProductId, UserId};

use super::{PgExecutor, RepositoryError, conflict_on_unique};
use crate::models::order::OrderTotals;
use crate::models::{Order, OrderItem, ShippingAddress};

const ORDER_COLUMNS: &str = "id, order_number, user_id, status, subtotal, discount_amount, \
     shipping_cost, total, coupon_code, payment_method, shipping_name, shipping_phone, \
     shipping_line1, shipping_line2, shipping_city, shipping_postal_code, shipping_country, \
     notes, created_at, updated_at";

const ITEM_COLUMNS: &str =
    "id, order_id, product_id, product_name, sku, unit_price, quantity, line_total";

/// Header fields of a new order.
#[derive(Debug)]
pub struct NewOrder<'a> {
    pub order_number: &'a str,
    pub user_id: UserId,
    pub totals: OrderTotals,
    pub coupon_code: Option<&'a str>,
    pub payment_method: PaymentMethod,
    pub shipping: &'a ShippingAddress,
    pub notes: Option<&'a str>,
}

/// An item snapshot to insert.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub sku: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
}

/// # Errors
///
/// Returns `RepositoryError::Conflict` on an order number collision.
pub async fn create(db: impl PgExecutor<'_>, new: &NewOrder<'_>) -> Result<Order, RepositoryError> {
    sqlx::query_as::<_, Order>(&format!(
        "INSERT INTO orders (id, order_number, user_id, subtotal, discount_amount, shipping_cost, \
             total, coupon_code, payment_method, shipping_name, shipping_phone, shipping_line1, \
             shipping_line2, shipping_city, shipping_postal_code, shipping_country, notes) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17) \
         RETURNING {ORDER_COLUMNS}"
    ))
    .bind(OrderId::generate())
    .bind(new.order_number)
    .bind(new.user_id)
    .bind(new.totals.subtotal)
    .bind(new.totals.discount)
    .bind(new.totals.shipping)
    .bind(new.totals.total)
    .bind(new.coupon_code)
    .bind(new.payment_method)
    .bind(&new.shipping.name)
    .bind(&new.shipping.phone)
    .bind(&new.shipping.line1)
    .bind(&new.shipping.line2)
    .bind(&new.shipping.city)
    .bind(&new.shipping.postal_code)
    .bind(&new.shipping.country)
    .bind(new.notes)
    .fetch_one(db)
    .await
    .map_err(conflict_on_unique("order number already exists"))
}

/// Insert every item snapshot in one statement.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn insert_items(
    db: impl PgExecutor<'_>,
    order_id: OrderId,
    items: &[NewOrderItem],
) -> Result<Vec<OrderItem>, RepositoryError> {
    let ids: Vec<OrderItemId> = items.iter().map(|_| OrderItemId::generate()).collect();
    let product_ids: Vec<ProductId> = items.iter().map(|i| i.product_id).collect();
    let names: Vec<&str> = items.iter().map(|i| i.product_name.as_str()).collect();
    let skus: Vec<&str> = items.iter().map(|i| i.sku.as_str()).collect();
    let prices: Vec<Decimal> = items.iter().map(|i| i.unit_price).collect();
    let quantities: Vec<i32> = items.iter().map(|i| i.quantity).collect();
    let totals: Vec<Decimal> = items.iter().map(|i| i.line_total).collect();

    let rows = sqlx::query_as::<_, OrderItem>(&format!(
        "INSERT INTO order_items (id, order_id, product_id, product_name, sku, unit_price, quantity, line_total) \
         SELECT u.id, $2, u.product_id, u.product_name, u.sku, u.unit_price, u.quantity, u.line_total \
         FROM UNNEST($1::uuid[], $3::uuid[], $4::text[], $5::text[], $6::numeric[], $7::int4[], $8::numeric[]) \
             AS u(id, product_id, product_name, sku, unit_price, quantity, line_total) \
         RETURNING {ITEM_COLUMNS}"
    ))
    .bind(&ids)
    .bind(order_id)
    .bind(&product_ids)
    .bind(&names)
    .bind(&skus)
    .bind(&prices)
    .bind(&quantities)
    .bind(&totals)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get(db: impl PgExecutor<'_>, id: OrderId) -> Result<Option<Order>, RepositoryError> {
    let row = sqlx::query_as::<_, Order>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(row)
}

/// Fetch and lock an order row.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock(db: impl PgExecutor<'_>, id: OrderId) -> Result<Option<Order>, RepositoryError> {
    let row = sqlx::query_as::<_, Order>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn items(db: impl PgExecutor<'_>, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
    let rows = sqlx::query_as::<_, OrderItem>(&format!(
        "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY product_name, id"
    ))
    .bind(order_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Orders of one user, newest first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list_for_user<'c, E>(
    db: E,
    user_id: UserId,
    page: PageRequest,
) -> Result<(Vec<Order>, i64), RepositoryError>
where
    E: PgExecutor<'c> + Copy,
{
    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(db)
        .await?;
    let rows = sqlx::query_as::<_, Order>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 \
         ORDER BY created_at DESC, id LIMIT $2 OFFSET $3"
    ))
    .bind(user_id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(db)
    .await?;
    Ok((rows, total))
}

/// All orders, optionally filtered by status, newest first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list_all<'c, E>(
    db: E,
    status: Option<OrderStatus>,
    page: PageRequest,
) -> Result<(Vec<Order>, i64), RepositoryError>
where
    E: PgExecutor<'c> + Copy,
{
    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM orders WHERE $1::order_status IS NULL OR status = $1",
    )
    .bind(status)
    .fetch_one(db)
    .await?;
    let rows = sqlx::query_as::<_, Order>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE $1::order_status IS NULL OR status = $1 \
         ORDER BY created_at DESC, id LIMIT $2 OFFSET $3"
    ))
    .bind(status)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(db)
    .await?;
    Ok((rows, total))
}

/// # Errors
///
/// Returns `RepositoryError::NotFound` if the order does not exist.
pub async fn set_status(
    db: impl PgExecutor<'_>,
    id: OrderId,
    status: OrderStatus,
) -> Result<Order, RepositoryError> {
    sqlx::query_as::<_, Order>(&format!(
        "UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {ORDER_COLUMNS}"
    ))
    .bind(id)
    .bind(status)
    .fetch_optional(db)
    .await?
    .ok_or(RepositoryError::NotFound)
}

/// Whether the user has a delivered order containing the product.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn has_delivered_purchase(
    db: impl PgExecutor<'_>,
    user_id: UserId,
    product_id: ProductId,
) -> Result<bool, RepositoryError> {
    let found = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS ( \
             SELECT 1 FROM orders o JOIN order_items oi ON oi.order_id = o.id \
             WHERE o.user_id = $1 AND oi.product_id = $2 AND o.status = 'delivered' \
         )",
    )
    .bind(user_id)
    .bind(product_id)
    .fetch_one(db)
    .await?;
    Ok(found)
}
