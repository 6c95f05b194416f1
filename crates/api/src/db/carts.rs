//! Carts and cart items.

use rust_decimal::Decimal;

use emporium_core::{CartId, CartItemId, ProductId, UserId};

use super::{PgExecutor, RepositoryError};
use crate::models::{Cart, CartLine};

const CART_COLUMNS: &str = "id, user_id, coupon_code, created_at, updated_at";

const LINE_SELECT: &str = "SELECT ci.id AS item_id, ci.product_id, p.category_id, \
        p.name AS product_name, p.slug AS product_slug, p.sku, p.image_url, \
        ci.unit_price AS added_price, p.price AS unit_price, ci.quantity, \
        p.stock_quantity, (p.is_active AND NOT p.is_deleted) AS is_active \
     FROM cart_items ci JOIN products p ON p.id = ci.product_id";

/// The user's cart, created on first access.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get_or_create(db: impl PgExecutor<'_>, user_id: UserId) -> Result<Cart, RepositoryError> {
    // The no-op update makes RETURNING yield the existing row on conflict.
    let cart = sqlx::query_as::<_, Cart>(&format!(
        "INSERT INTO carts (id, user_id) VALUES ($1, $2) \
         ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id \
         RETURNING {CART_COLUMNS}"
    ))
    .bind(CartId::generate())
    .bind(user_id)
    .fetch_one(db)
    .await?;
    Ok(cart)
}

/// Lines of a cart joined with live product data, oldest first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lines(db: impl PgExecutor<'_>, cart_id: CartId) -> Result<Vec<CartLine>, RepositoryError> {
    let rows = sqlx::query_as::<_, CartLine>(&format!(
        "{LINE_SELECT} WHERE ci.cart_id = $1 ORDER BY ci.created_at, ci.id"
    ))
    .bind(cart_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn line(
    db: impl PgExecutor<'_>,
    cart_id: CartId,
    item_id: CartItemId,
) -> Result<Option<CartLine>, RepositoryError> {
    let row = sqlx::query_as::<_, CartLine>(&format!(
        "{LINE_SELECT} WHERE ci.cart_id = $1 AND ci.id = $2"
    ))
    .bind(cart_id)
    .bind(item_id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Current quantity of a product in the cart, if present.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn quantity_of(
    db: impl PgExecutor<'_>,
    cart_id: CartId,
    product_id: ProductId,
) -> Result<Option<i32>, RepositoryError> {
    let quantity = sqlx::query_scalar::<_, i32>(
        "SELECT quantity FROM cart_items WHERE cart_id = $1 AND product_id = $2",
    )
    .bind(cart_id)
    .bind(product_id)
    .fetch_optional(db)
    .await?;
    Ok(quantity)
}

/// Insert a line, or set the quantity of the existing line for the product.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn upsert_item(
    db: impl PgExecutor<'_>,
    cart_id: CartId,
    product_id: ProductId,
    quantity: i32,
    unit_price: Decimal,
) -> Result<CartItemId, RepositoryError> {
    let id = sqlx::query_scalar::<_, CartItemId>(
        "INSERT INTO cart_items (id, cart_id, product_id, quantity, unit_price) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (cart_id, product_id) \
         DO UPDATE SET quantity = EXCLUDED.quantity, updated_at = NOW() \
         RETURNING id",
    )
    .bind(CartItemId::generate())
    .bind(cart_id)
    .bind(product_id)
    .bind(quantity)
    .bind(unit_price)
    .fetch_one(db)
    .await?;
    Ok(id)
}

/// # Errors
///
/// Returns `RepositoryError::NotFound` if the item is not in the cart.
pub async fn set_quantity(
    db: impl PgExecutor<'_>,
    cart_id: CartId,
    item_id: CartItemId,
    quantity: i32,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "UPDATE cart_items SET quantity = $3, updated_at = NOW() WHERE cart_id = $1 AND id = $2",
    )
    .bind(cart_id)
    .bind(item_id)
    .bind(quantity)
    .execute(db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

/// # Errors
///
/// Returns `RepositoryError::NotFound` if the item is not in the cart.
pub async fn remove_item(
    db: impl PgExecutor<'_>,
    cart_id: CartId,
    item_id: CartItemId,
) -> Result<(), RepositoryError> {
    let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND id = $2")
        .bind(cart_id)
        .bind(item_id)
        .execute(db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

/// Remove every line and the coupon.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn clear(db: impl PgExecutor<'_>, cart_id: CartId) -> Result<(), RepositoryError> {
    sqlx::query(
        "WITH removed AS (DELETE FROM cart_items WHERE cart_id = $1) \
         UPDATE carts SET coupon_code = NULL, updated_at = NOW() WHERE id = $1",
    )
    .bind(cart_id)
    .execute(db)
    .await?;
    Ok(())
}

/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn set_coupon(
    db: impl PgExecutor<'_>,
    cart_id: CartId,
    coupon_code: Option<&str>,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE carts SET coupon_code = $2, updated_at = NOW() WHERE id = $1")
        .bind(cart_id)
        .bind(coupon_code)
        .execute(db)
        .await?;
    Ok(())
}
