//! Coupons and their redemptions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use emporium_core::{CategoryId, CouponId, DiscountType, OrderId, PageRequest, UserId};

use super::{PgExecutor, RepositoryError, conflict_on_unique};
use crate::models::Coupon;

const COUPON_COLUMNS: &str = "id, code, description, discount_type, discount_value, \
     minimum_order_amount, maximum_discount_amount, usage_limit, usage_limit_per_user, used_count, \
     applicable_category_ids, starts_at, expires_at, is_active, created_at, updated_at";

/// Writable coupon fields. `code` must already be normalized.
#[derive(Debug, Clone)]
pub struct CouponFields {
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub minimum_order_amount: Option<Decimal>,
    pub maximum_discount_amount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub usage_limit_per_user: Option<i32>,
    pub applicable_category_ids: Vec<CategoryId>,
    pub starts_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
}

/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list<'c, E>(db: E, page: PageRequest) -> Result<(Vec<Coupon>, i64), RepositoryError>
where
    E: PgExecutor<'c> + Copy,
{
    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM coupons WHERE NOT is_deleted")
        .fetch_one(db)
        .await?;
    let rows = sqlx::query_as::<_, Coupon>(&format!(
        "SELECT {COUPON_COLUMNS} FROM coupons WHERE NOT is_deleted \
         ORDER BY created_at DESC, id LIMIT $1 OFFSET $2"
    ))
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(db)
    .await?;
    Ok((rows, total))
}

/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get(db: impl PgExecutor<'_>, id: CouponId) -> Result<Option<Coupon>, RepositoryError> {
    let row = sqlx::query_as::<_, Coupon>(&format!(
        "SELECT {COUPON_COLUMNS} FROM coupons WHERE id = $1 AND NOT is_deleted"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Look up by normalized code.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get_by_code(db: impl PgExecutor<'_>, code: &str) -> Result<Option<Coupon>, RepositoryError> {
    let row = sqlx::query_as::<_, Coupon>(&format!(
        "SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1 AND NOT is_deleted"
    ))
    .bind(code)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Look up by code and lock the row until the transaction ends.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_by_code(db: impl PgExecutor<'_>, code: &str) -> Result<Option<Coupon>, RepositoryError> {
    let row = sqlx::query_as::<_, Coupon>(&format!(
        "SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1 AND NOT is_deleted FOR UPDATE"
    ))
    .bind(code)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn exists_with_code(db: impl PgExecutor<'_>, code: &str) -> Result<bool, RepositoryError> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM coupons WHERE code = $1 AND NOT is_deleted)",
    )
    .bind(code)
    .fetch_one(db)
    .await?;
    Ok(exists)
}

/// # Errors
///
/// Returns `RepositoryError::Conflict` if the code is taken.
pub async fn create(db: impl PgExecutor<'_>, fields: &CouponFields) -> Result<Coupon, RepositoryError> {
    sqlx::query_as::<_, Coupon>(&format!(
        "INSERT INTO coupons (id, code, description, discount_type, discount_value, \
             minimum_order_amount, maximum_discount_amount, usage_limit, usage_limit_per_user, \
             applicable_category_ids, starts_at, expires_at, is_active) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
         RETURNING {COUPON_COLUMNS}"
    ))
    .bind(CouponId::generate())
    .bind(&fields.code)
    .bind(&fields.description)
    .bind(fields.discount_type)
    .bind(fields.discount_value)
    .bind(fields.minimum_order_amount)
    .bind(fields.maximum_discount_amount)
    .bind(fields.usage_limit)
    .bind(fields.usage_limit_per_user)
    .bind(&fields.applicable_category_ids)
    .bind(fields.starts_at)
    .bind(fields.expires_at)
    .bind(fields.is_active)
    .fetch_one(db)
    .await
    .map_err(conflict_on_unique("coupon code already exists"))
}

/// # Errors
///
/// Returns `RepositoryError::NotFound` if the coupon does not exist, or
/// `RepositoryError::Conflict` if the new code is taken.
pub async fn update(
    db: impl PgExecutor<'_>,
    id: CouponId,
    fields: &CouponFields,
) -> Result<Coupon, RepositoryError> {
    sqlx::query_as::<_, Coupon>(&format!(
        "UPDATE coupons SET code = $2, description = $3, discount_type = $4, discount_value = $5, \
             minimum_order_amount = $6, maximum_discount_amount = $7, usage_limit = $8, \
             usage_limit_per_user = $9, applicable_category_ids = $10, starts_at = $11, \
             expires_at = $12, is_active = $13, updated_at = NOW() \
         WHERE id = $1 AND NOT is_deleted \
         RETURNING {COUPON_COLUMNS}"
    ))
    .bind(id)
    .bind(&fields.code)
    .bind(&fields.description)
    .bind(fields.discount_type)
    .bind(fields.discount_value)
    .bind(fields.minimum_order_amount)
    .bind(fields.maximum_discount_amount)
    .bind(fields.usage_limit)
    .bind(fields.usage_limit_per_user)
    .bind(&fields.applicable_category_ids)
    .bind(fields.starts_at)
    .bind(fields.expires_at)
    .bind(fields.is_active)
    .fetch_optional(db)
    .await
    .map_err(conflict_on_unique("coupon code already exists"))?
    .ok_or(RepositoryError::NotFound)
}

/// Soft delete.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the coupon does not exist.
pub async fn soft_delete(db: impl PgExecutor<'_>, id: CouponId) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "UPDATE coupons SET is_deleted = TRUE, is_active = FALSE, updated_at = NOW() \
         WHERE id = $1 AND NOT is_deleted",
    )
    .bind(id)
    .execute(db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

/// Number of times `user_id` has redeemed the coupon.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn usage_count_for_user(
    db: impl PgExecutor<'_>,
    coupon_id: CouponId,
    user_id: UserId,
) -> Result<i64, RepositoryError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM coupon_usages WHERE coupon_id = $1 AND user_id = $2",
    )
    .bind(coupon_id)
    .bind(user_id)
    .fetch_one(db)
    .await?;
    Ok(count)
}

/// Insert a redemption and bump `used_count` in one statement.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn record_usage(
    db: impl PgExecutor<'_>,
    coupon_id: CouponId,
    user_id: UserId,
    order_id: OrderId,
    discount_amount: Decimal,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "WITH redemption AS ( \
             INSERT INTO coupon_usages (id, coupon_id, user_id, order_id, discount_amount) \
             VALUES ($1, $2, $3, $4, $5) \
         ) \
         UPDATE coupons SET used_count = used_count + 1, updated_at = NOW() WHERE id = $2",
    )
    .bind(Uuid::new_v4())
    .bind(coupon_id)
    .bind(user_id)
    .bind(order_id)
    .bind(discount_amount)
    .execute(db)
    .await?;
    Ok(())
}
