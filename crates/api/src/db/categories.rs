//! Catalog categories.

use std::collections::HashMap;

use emporium_core::CategoryId;

use super::{PgExecutor, RepositoryError, conflict_on_unique};
use crate::models::Category;

const CATEGORY_COLUMNS: &str =
    "id, name, slug, description, parent_id, sort_order, created_at, updated_at";

/// Writable category fields.
#[derive(Debug, Clone)]
pub struct CategoryFields {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<CategoryId>,
    pub sort_order: i32,
}

/// All live categories ordered by `sort_order`, then name.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list(db: impl PgExecutor<'_>) -> Result<Vec<Category>, RepositoryError> {
    let rows = sqlx::query_as::<_, Category>(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM categories WHERE NOT is_deleted ORDER BY sort_order, name"
    ))
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get(db: impl PgExecutor<'_>, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
    let row = sqlx::query_as::<_, Category>(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1 AND NOT is_deleted"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Child -> parent map over live categories.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn parent_map(
    db: impl PgExecutor<'_>,
) -> Result<HashMap<CategoryId, Option<CategoryId>>, RepositoryError> {
    let rows = sqlx::query_as::<_, (CategoryId, Option<CategoryId>)>(
        "SELECT id, parent_id FROM categories WHERE NOT is_deleted",
    )
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().collect())
}

/// # Errors
///
/// Returns `RepositoryError::Conflict` if the slug is taken.
pub async fn create(db: impl PgExecutor<'_>, fields: &CategoryFields) -> Result<Category, RepositoryError> {
    sqlx::query_as::<_, Category>(&format!(
        "INSERT INTO categories (id, name, slug, description, parent_id, sort_order) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING {CATEGORY_COLUMNS}"
    ))
    .bind(CategoryId::generate())
    .bind(&fields.name)
    .bind(&fields.slug)
    .bind(&fields.description)
    .bind(fields.parent_id)
    .bind(fields.sort_order)
    .fetch_one(db)
    .await
    .map_err(conflict_on_unique("category slug already exists"))
}

/// # Errors
///
/// Returns `RepositoryError::NotFound` if the category does not exist, or
/// `RepositoryError::Conflict` if the slug is taken.
pub async fn update(
    db: impl PgExecutor<'_>,
    id: CategoryId,
    fields: &CategoryFields,
) -> Result<Category, RepositoryError> {
    sqlx::query_as::<_, Category>(&format!(
        "UPDATE categories \
         SET name = $2, slug = $3, description = $4, parent_id = $5, sort_order = $6, updated_at = NOW() \
         WHERE id = $1 AND NOT is_deleted \
         RETURNING {CATEGORY_COLUMNS}"
    ))
    .bind(id)
    .bind(&fields.name)
    .bind(&fields.slug)
    .bind(&fields.description)
    .bind(fields.parent_id)
    .bind(fields.sort_order)
    .fetch_optional(db)
    .await
    .map_err(conflict_on_unique("category slug already exists"))?
    .ok_or(RepositoryError::NotFound)
}

/// Counts of live child categories and live products referencing `id`.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn dependents(db: impl PgExecutor<'_>, id: CategoryId) -> Result<(i64, i64), RepositoryError> {
    let counts = sqlx::query_as::<_, (i64, i64)>(
        "SELECT \
            (SELECT COUNT(*) FROM categories WHERE parent_id = $1 AND NOT is_deleted), \
            (SELECT COUNT(*) FROM products WHERE category_id = $1 AND NOT is_deleted)",
    )
    .bind(id)
    .fetch_one(db)
    .await?;
    Ok(counts)
}

/// Soft delete.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the category does not exist.
pub async fn soft_delete(db: impl PgExecutor<'_>, id: CategoryId) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "UPDATE categories SET is_deleted = TRUE, updated_at = NOW() WHERE id = $1 AND NOT is_deleted",
    )
    .bind(id)
    .execute(db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}
