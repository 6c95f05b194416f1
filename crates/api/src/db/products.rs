//! Products, including search and stock locking.

use rust_decimal::Decimal;
use sqlx::{Postgres, QueryBuilder};

use emporium_core::{CategoryId, PageRequest, ProductId};

use super::{PgExecutor, RepositoryError, conflict_on_unique};
use crate::models::product::ProductSort;
use crate::models::{Product, RatingSummary};

const PRODUCT_COLUMNS: &str = "p.id, p.category_id, p.name, p.slug, p.sku, p.description, p.price, \
     p.compare_at_price, p.stock_quantity, p.low_stock_threshold, p.image_url, p.is_active, \
     p.created_at, p.updated_at";

/// Approved-review aggregate joined as `r`.
const RATING_JOIN: &str = "LEFT JOIN LATERAL ( \
        SELECT ROUND(AVG(rv.rating)::numeric, 1) AS average, COUNT(*) AS count \
        FROM product_reviews rv \
        WHERE rv.product_id = p.id AND rv.is_approved AND NOT rv.is_deleted \
     ) r ON TRUE";

/// A product row with its rating aggregate.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductWithRating {
    #[sqlx(flatten)]
    pub product: Product,
    #[sqlx(flatten)]
    pub rating: RatingSummary,
}

/// Writable product fields.
#[derive(Debug, Clone)]
pub struct ProductFields {
    pub category_id: CategoryId,
    pub name: String,
    pub slug: String,
    pub sku: String,
    pub description: String,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub low_stock_threshold: i32,
    pub image_url: Option<String>,
    pub is_active: bool,
}

/// Filters for catalog search.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Case-insensitive substring over name, description and SKU.
    pub text: Option<String>,
    pub category_id: Option<CategoryId>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub in_stock: Option<bool>,
    pub sort: ProductSort,
}

/// Escape `LIKE` wildcards in user input.
/// Escape `LIKE` metacharacters, backslash first.
fn escape_like(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn like_pattern(text: &str) -> String {
    format!("%{}%", escape_like(text))
}

fn prefix_pattern(text: &str) -> String {
    format!("{}%", escape_like(text))
}

fn push_filters<'a>(qb: &mut QueryBuilder<'a, Postgres>, filter: &'a SearchFilter) {
    qb.push(" WHERE p.is_active AND NOT p.is_deleted");
    if let Some(text) = &filter.text {
        let pattern = like_pattern(text);
        qb.push(" AND (p.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.description ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.sku ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(category_id) = filter.category_id {
        qb.push(" AND p.category_id = ").push_bind(category_id);
    }
    if let Some(min) = filter.min_price {
        qb.push(" AND p.price >= ").push_bind(min);
    }
    if let Some(max) = filter.max_price {
        qb.push(" AND p.price <= ").push_bind(max);
    }
    match filter.in_stock {
        Some(true) => {
            qb.push(" AND p.stock_quantity > 0");
        }
        Some(false) => {
            qb.push(" AND p.stock_quantity = 0");
        }
        None => {}
    }
}

/// Filtered, sorted, paged product search. Returns the page and the total match count.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn search<'c, E>(
    db: E,
    filter: &SearchFilter,
    page: PageRequest,
) -> Result<(Vec<ProductWithRating>, i64), RepositoryError>
where
    E: PgExecutor<'c> + Copy,
{
    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products p");
    push_filters(&mut count, filter);
    let total = count.build_query_scalar::<i64>().fetch_one(db).await?;

    let mut qb = QueryBuilder::<Postgres>::new(format!(
        "SELECT {PRODUCT_COLUMNS}, r.average, r.count FROM products p {RATING_JOIN}"
    ));
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY ");
    match (&filter.sort, &filter.text) {
        (ProductSort::Relevance, Some(text)) => {
            // Prefix matches on the name first, then any name match, then the rest.
            qb.push("CASE WHEN p.name ILIKE ")
                .push_bind(prefix_pattern(text))
                .push(" THEN 0 WHEN p.name ILIKE ")
                .push_bind(like_pattern(text))
                .push(" THEN 1 ELSE 2 END, p.name, p.id");
        }
        (sort, _) => {
            qb.push(sort.order_by());
        }
    }
    qb.push(" LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());

    let rows = qb.build_query_as::<ProductWithRating>().fetch_all(db).await?;
    Ok((rows, total))
}

/// Up to `limit` active product names starting with `prefix`.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn suggest_names(
    db: impl PgExecutor<'_>,
    prefix: &str,
    limit: i64,
) -> Result<Vec<String>, RepositoryError> {
    let pattern = prefix_pattern(prefix);
    let names = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT name FROM products \
         WHERE is_active AND NOT is_deleted AND name ILIKE $1 \
         ORDER BY name LIMIT $2",
    )
    .bind(pattern)
    .bind(limit)
    .fetch_all(db)
    .await?;
    Ok(names)
}

/// Product with rating by ID, active or not.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get(db: impl PgExecutor<'_>, id: ProductId) -> Result<Option<ProductWithRating>, RepositoryError> {
    let row = sqlx::query_as::<_, ProductWithRating>(&format!(
        "SELECT {PRODUCT_COLUMNS}, r.average, r.count FROM products p {RATING_JOIN} \
         WHERE p.id = $1 AND NOT p.is_deleted"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get_by_slug(
    db: impl PgExecutor<'_>,
    slug: &str,
) -> Result<Option<ProductWithRating>, RepositoryError> {
    let row = sqlx::query_as::<_, ProductWithRating>(&format!(
        "SELECT {PRODUCT_COLUMNS}, r.average, r.count FROM products p {RATING_JOIN} \
         WHERE p.slug = $1 AND NOT p.is_deleted"
    ))
    .bind(slug)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Bare product row, without the rating join.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get_plain(db: impl PgExecutor<'_>, id: ProductId) -> Result<Option<Product>, RepositoryError> {
    let row = sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.id = $1 AND NOT p.is_deleted"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Lock product rows for the rest of the transaction, in ID order.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_for_update(
    db: impl PgExecutor<'_>,
    ids: &[ProductId],
) -> Result<Vec<Product>, RepositoryError> {
    let rows = sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products p \
         WHERE p.id = ANY($1) AND NOT p.is_deleted \
         ORDER BY p.id FOR UPDATE"
    ))
    .bind(ids)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Overwrite the stock level of a locked product.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the product does not exist.
pub async fn set_stock(
    db: impl PgExecutor<'_>,
    id: ProductId,
    stock_quantity: i32,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "UPDATE products SET stock_quantity = $2, updated_at = NOW() WHERE id = $1 AND NOT is_deleted",
    )
    .bind(id)
    .bind(stock_quantity)
    .execute(db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

/// Active products at or below their low-stock threshold, emptiest first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn low_stock(db: impl PgExecutor<'_>) -> Result<Vec<Product>, RepositoryError> {
    let rows = sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products p \
         WHERE p.is_active AND NOT p.is_deleted AND p.stock_quantity <= p.low_stock_threshold \
         ORDER BY p.stock_quantity, p.name"
    ))
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// # Errors
///
/// Returns `RepositoryError::Conflict` if the slug or SKU is taken.
pub async fn create(
    db: impl PgExecutor<'_>,
    fields: &ProductFields,
    stock_quantity: i32,
) -> Result<Product, RepositoryError> {
    sqlx::query_as::<_, Product>(&format!(
        "INSERT INTO products AS p (id, category_id, name, slug, sku, description, price, \
             compare_at_price, stock_quantity, low_stock_threshold, image_url, is_active) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         RETURNING {PRODUCT_COLUMNS}"
    ))
    .bind(ProductId::generate())
    .bind(fields.category_id)
    .bind(&fields.name)
    .bind(&fields.slug)
    .bind(&fields.sku)
    .bind(&fields.description)
    .bind(fields.price)
    .bind(fields.compare_at_price)
    .bind(stock_quantity)
    .bind(fields.low_stock_threshold)
    .bind(&fields.image_url)
    .bind(fields.is_active)
    .fetch_one(db)
    .await
    .map_err(conflict_on_unique("product slug or sku already exists"))
}

/// Update everything except stock, which only moves through inventory.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the product does not exist, or
/// `RepositoryError::Conflict` if the slug or SKU is taken.
pub async fn update(
    db: impl PgExecutor<'_>,
    id: ProductId,
    fields: &ProductFields,
) -> Result<Product, RepositoryError> {
    sqlx::query_as::<_, Product>(&format!(
        "UPDATE products AS p \
         SET category_id = $2, name = $3, slug = $4, sku = $5, description = $6, price = $7, \
             compare_at_price = $8, low_stock_threshold = $9, image_url = $10, is_active = $11, \
             updated_at = NOW() \
         WHERE p.id = $1 AND NOT p.is_deleted \
         RETURNING {PRODUCT_COLUMNS}"
    ))
    .bind(id)
    .bind(fields.category_id)
    .bind(&fields.name)
    .bind(&fields.slug)
    .bind(&fields.sku)
    .bind(&fields.description)
    .bind(fields.price)
    .bind(fields.compare_at_price)
    .bind(fields.low_stock_threshold)
    .bind(&fields.image_url)
    .bind(fields.is_active)
    .fetch_optional(db)
    .await
    .map_err(conflict_on_unique("product slug or sku already exists"))?
    .ok_or(RepositoryError::NotFound)
}

/// Soft delete.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the product does not exist.
pub async fn soft_delete(db: impl PgExecutor<'_>, id: ProductId) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "UPDATE products SET is_deleted = TRUE, is_active = FALSE, updated_at = NOW() \
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("mug"), "%mug%");
    }

    #[test]
    fn test_backslash_escaped_before_wildcards() {
        assert_eq!(like_pattern(r"C:\temp"), r"%C:\\temp%");
        assert_eq!(prefix_pattern(r"a\%"), r"a\\\%%");
    }

    #[test]
    fn test_search_sql_shape() {
        let filter = SearchFilter {
            text: Some("mug".to_string()),
            category_id: Some(CategoryId::generate()),
            min_price: Some(Decimal::ONE),
            max_price: None,
            in_stock: Some(true),
            sort: ProductSort::PriceAsc,
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products p");
        push_filters(&mut qb, &filter);
        let sql = qb.sql();
        assert!(sql.contains("p.name ILIKE $1"));
        assert!(sql.contains("p.category_id = $4"));
        assert!(sql.contains("p.price >= $5"));
        assert!(sql.contains("p.stock_quantity > 0"));
        assert!(!sql.contains("p.price <="));
    }
}
