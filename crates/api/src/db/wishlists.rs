//! Wishlists and their items.

use rust_decimal::Decimal;

use emporium_core::{ProductId, UserId, WishlistId, WishlistItemId};

use super::{PgExecutor, RepositoryError, conflict_on_unique};
use crate::models::WishlistItemSnapshot;
use crate::models::wishlist::Wishlist;

const SNAPSHOT_SELECT: &str = "SELECT wi.id AS item_id, wi.wishlist_id, w.user_id, wi.product_id, \
        p.name AS product_name, p.slug AS product_slug, p.image_url, wi.price_at_add, \
        wi.last_known_price, wi.was_in_stock, wi.notify_on_price_drop, wi.notify_on_back_in_stock, \
        p.price AS current_price, p.stock_quantity AS current_stock, wi.created_at AS added_at \
     FROM wishlist_items wi \
     JOIN wishlists w ON w.id = wi.wishlist_id \
     JOIN products p ON p.id = wi.product_id";

/// The user's wishlist, created on first access.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get_or_create(db: impl PgExecutor<'_>, user_id: UserId) -> Result<Wishlist, RepositoryError> {
    let row = sqlx::query_as::<_, Wishlist>(
        "INSERT INTO wishlists (id, user_id) VALUES ($1, $2) \
         ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id \
         RETURNING id, user_id, created_at",
    )
    .bind(WishlistId::generate())
    .bind(user_id)
    .fetch_one(db)
    .await?;
    Ok(row)
}

/// Items of one wishlist, newest first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn items(
    db: impl PgExecutor<'_>,
    wishlist_id: WishlistId,
) -> Result<Vec<WishlistItemSnapshot>, RepositoryError> {
    let rows = sqlx::query_as::<_, WishlistItemSnapshot>(&format!(
        "{SNAPSHOT_SELECT} WHERE wi.wishlist_id = $1 AND NOT p.is_deleted ORDER BY wi.created_at DESC, wi.id"
    ))
    .bind(wishlist_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Every item on a live product, across all users, for the sweeps.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn all_snapshots(db: impl PgExecutor<'_>) -> Result<Vec<WishlistItemSnapshot>, RepositoryError> {
    let rows = sqlx::query_as::<_, WishlistItemSnapshot>(&format!(
        "{SNAPSHOT_SELECT} WHERE p.is_active AND NOT p.is_deleted ORDER BY wi.id"
    ))
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Notification preferences for a new item.
#[derive(Debug, Clone, Copy)]
pub struct NotifyFlags {
    pub on_price_drop: bool,
    pub on_back_in_stock: bool,
}

/// # Errors
///
/// Returns `RepositoryError::Conflict` if the product is already on the wishlist.
pub async fn add_item(
    db: impl PgExecutor<'_>,
    wishlist_id: WishlistId,
    product_id: ProductId,
    price: Decimal,
    in_stock: bool,
    flags: NotifyFlags,
) -> Result<WishlistItemId, RepositoryError> {
    sqlx::query_scalar::<_, WishlistItemId>(
        "INSERT INTO wishlist_items (id, wishlist_id, product_id, price_at_add, last_known_price, \
             was_in_stock, notify_on_price_drop, notify_on_back_in_stock) \
         VALUES ($1, $2, $3, $4, $4, $5, $6, $7) RETURNING id",
    )
    .bind(WishlistItemId::generate())
    .bind(wishlist_id)
    .bind(product_id)
    .bind(price)
    .bind(in_stock)
    .bind(flags.on_price_drop)
    .bind(flags.on_back_in_stock)
    .fetch_one(db)
    .await
    .map_err(conflict_on_unique("product is already in the wishlist"))
}

/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn contains(
    db: impl PgExecutor<'_>,
    wishlist_id: WishlistId,
    product_id: ProductId,
) -> Result<bool, RepositoryError> {
    let found = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM wishlist_items WHERE wishlist_id = $1 AND product_id = $2)",
    )
    .bind(wishlist_id)
    .bind(product_id)
    .fetch_one(db)
    .await?;
    Ok(found)
}

/// # Errors
///
/// Returns `RepositoryError::NotFound` if the product is not on the wishlist.
pub async fn remove_item(
    db: impl PgExecutor<'_>,
    wishlist_id: WishlistId,
    product_id: ProductId,
) -> Result<(), RepositoryError> {
    let result = sqlx::query("DELETE FROM wishlist_items WHERE wishlist_id = $1 AND product_id = $2")
        .bind(wishlist_id)
        .bind(product_id)
        .execute(db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn clear(db: impl PgExecutor<'_>, wishlist_id: WishlistId) -> Result<u64, RepositoryError> {
    let result = sqlx::query("DELETE FROM wishlist_items WHERE wishlist_id = $1")
        .bind(wishlist_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

/// Refresh the stored price and stock snapshot of an item.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn update_snapshot(
    db: impl PgExecutor<'_>,
    item_id: WishlistItemId,
    last_known_price: Decimal,
    was_in_stock: bool,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE wishlist_items SET last_known_price = $2, was_in_stock = $3, updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(item_id)
    .bind(last_known_price)
    .bind(was_in_stock)
    .execute(db)
    .await?;
    Ok(())
}
