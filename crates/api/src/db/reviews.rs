//! Product reviews.

use emporium_core::{PageRequest, ProductId, ReviewId, UserId};

use super::{PgExecutor, RepositoryError, conflict_on_unique};
use crate::models::Review;
use crate::models::review::ReviewContent;

const REVIEW_SELECT: &str = "SELECT rv.id, rv.product_id, rv.user_id, u.first_name AS author_name, \
        rv.rating, rv.title, rv.body, rv.is_verified_purchase, rv.is_approved, rv.helpful_count, \
        rv.created_at, rv.updated_at \
     FROM product_reviews rv JOIN users u ON u.id = rv.user_id";

/// Approved reviews of a product, newest first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list_approved<'c, E>(
    db: E,
    product_id: ProductId,
    page: PageRequest,
) -> Result<(Vec<Review>, i64), RepositoryError>
where
    E: PgExecutor<'c> + Copy,
{
    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM product_reviews WHERE product_id = $1 AND is_approved AND NOT is_deleted",
    )
    .bind(product_id)
    .fetch_one(db)
    .await?;
    let rows = sqlx::query_as::<_, Review>(&format!(
        "{REVIEW_SELECT} WHERE rv.product_id = $1 AND rv.is_approved AND NOT rv.is_deleted \
         ORDER BY rv.created_at DESC, rv.id LIMIT $2 OFFSET $3"
    ))
    .bind(product_id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(db)
    .await?;
    Ok((rows, total))
}

/// `(rating, count)` over approved reviews of a product.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn rating_counts(
    db: impl PgExecutor<'_>,
    product_id: ProductId,
) -> Result<Vec<(i16, i64)>, RepositoryError> {
    let rows = sqlx::query_as::<_, (i16, i64)>(
        "SELECT rating, COUNT(*) FROM product_reviews \
         WHERE product_id = $1 AND is_approved AND NOT is_deleted GROUP BY rating",
    )
    .bind(product_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Reviews awaiting moderation, oldest first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list_pending<'c, E>(db: E, page: PageRequest) -> Result<(Vec<Review>, i64), RepositoryError>
where
    E: PgExecutor<'c> + Copy,
{
    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM product_reviews WHERE NOT is_approved AND NOT is_deleted",
    )
    .fetch_one(db)
    .await?;
    let rows = sqlx::query_as::<_, Review>(&format!(
        "{REVIEW_SELECT} WHERE NOT rv.is_approved AND NOT rv.is_deleted \
         ORDER BY rv.created_at, rv.id LIMIT $1 OFFSET $2"
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
pub async fn get(db: impl PgExecutor<'_>, id: ReviewId) -> Result<Option<Review>, RepositoryError> {
    let row = sqlx::query_as::<_, Review>(&format!(
        "{REVIEW_SELECT} WHERE rv.id = $1 AND NOT rv.is_deleted"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn exists_for_user(
    db: impl PgExecutor<'_>,
    product_id: ProductId,
    user_id: UserId,
) -> Result<bool, RepositoryError> {
    let found = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM product_reviews \
             WHERE product_id = $1 AND user_id = $2 AND NOT is_deleted)",
    )
    .bind(product_id)
    .bind(user_id)
    .fetch_one(db)
    .await?;
    Ok(found)
}

/// Insert an unapproved review and return its ID.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the user already reviewed the product.
pub async fn create(
    db: impl PgExecutor<'_>,
    product_id: ProductId,
    user_id: UserId,
    content: &ReviewContent,
    is_verified_purchase: bool,
) -> Result<ReviewId, RepositoryError> {
    sqlx::query_scalar::<_, ReviewId>(
        "INSERT INTO product_reviews (id, product_id, user_id, rating, title, body, is_verified_purchase) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
    )
    .bind(ReviewId::generate())
    .bind(product_id)
    .bind(user_id)
    .bind(content.rating)
    .bind(&content.title)
    .bind(&content.body)
    .bind(is_verified_purchase)
    .fetch_one(db)
    .await
    .map_err(conflict_on_unique("you have already reviewed this product"))
}

/// Replace the content of the author's own review and send it back to moderation.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if no such review belongs to the user.
pub async fn update_own(
    db: impl PgExecutor<'_>,
    id: ReviewId,
    user_id: UserId,
    content: &ReviewContent,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "UPDATE product_reviews \
         SET rating = $3, title = $4, body = $5, is_approved = FALSE, updated_at = NOW() \
         WHERE id = $1 AND user_id = $2 AND NOT is_deleted",
    )
    .bind(id)
    .bind(user_id)
    .bind(content.rating)
    .bind(&content.title)
    .bind(&content.body)
    .execute(db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

/// Soft delete the author's own review.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if no such review belongs to the user.
pub async fn soft_delete_own(
    db: impl PgExecutor<'_>,
    id: ReviewId,
    user_id: UserId,
) -> Result<ProductId, RepositoryError> {
    sqlx::query_scalar::<_, ProductId>(
        "UPDATE product_reviews SET is_deleted = TRUE, updated_at = NOW() \
         WHERE id = $1 AND user_id = $2 AND NOT is_deleted RETURNING product_id",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(db)
    .await?
    .ok_or(RepositoryError::NotFound)
}

/// # Errors
///
/// Returns `RepositoryError::NotFound` if the review does not exist.
pub async fn approve(db: impl PgExecutor<'_>, id: ReviewId) -> Result<ProductId, RepositoryError> {
    sqlx::query_scalar::<_, ProductId>(
        "UPDATE product_reviews SET is_approved = TRUE, updated_at = NOW() \
         WHERE id = $1 AND NOT is_deleted RETURNING product_id",
    )
    .bind(id)
    .fetch_optional(db)
    .await?
    .ok_or(RepositoryError::NotFound)
}

/// Lock an approved review and read its helpful count.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_helpful_count(db: impl PgExecutor<'_>, id: ReviewId) -> Result<Option<i32>, RepositoryError> {
    let count = sqlx::query_scalar::<_, i32>(
        "SELECT helpful_count FROM product_reviews \
         WHERE id = $1 AND is_approved AND NOT is_deleted FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(count)
}

/// Record a helpful vote. `false` when the user already voted.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn record_helpful_vote(
    db: impl PgExecutor<'_>,
    id: ReviewId,
    user_id: UserId,
) -> Result<bool, RepositoryError> {
    let inserted = sqlx::query(
        "INSERT INTO review_helpful_votes (review_id, user_id) VALUES ($1, $2) \
         ON CONFLICT DO NOTHING",
    )
    .bind(id)
    .bind(user_id)
    .execute(db)
    .await?
    .rows_affected();
    Ok(inserted == 1)
}

/// # Errors
///
/// Returns `RepositoryError::NotFound` if the review does not exist or is unapproved.
pub async fn increment_helpful(db: impl PgExecutor<'_>, id: ReviewId) -> Result<i32, RepositoryError> {
    sqlx::query_scalar::<_, i32>(
        "UPDATE product_reviews SET helpful_count = helpful_count + 1 \
         WHERE id = $1 AND is_approved AND NOT is_deleted RETURNING helpful_count",
    )
    .bind(id)
    .fetch_optional(db)
    .await?
    .ok_or(RepositoryError::NotFound)
}
