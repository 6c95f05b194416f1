//! Inventory movement ledger.

use uuid::Uuid;

use emporium_core::{MovementType, PageRequest, ProductId};

use super::{PgExecutor, RepositoryError};
use crate::models::InventoryMovement;

const MOVEMENT_COLUMNS: &str =
    "id, product_id, movement_type, quantity_change, quantity_after, reason, reference_id, created_at";

/// A ledger entry to append.
#[derive(Debug, Clone)]
pub struct NewMovement<'a> {
    pub product_id: ProductId,
    pub movement_type: MovementType,
    pub quantity_change: i32,
    pub quantity_after: i32,
    pub reason: Option<&'a str>,
    pub reference_id: Option<Uuid>,
}

/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn record(
    db: impl PgExecutor<'_>,
    movement: &NewMovement<'_>,
) -> Result<InventoryMovement, RepositoryError> {
    let row = sqlx::query_as::<_, InventoryMovement>(&format!(
        "INSERT INTO inventory_movements (id, product_id, movement_type, quantity_change, \
             quantity_after, reason, reference_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {MOVEMENT_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(movement.product_id)
    .bind(movement.movement_type)
    .bind(movement.quantity_change)
    .bind(movement.quantity_after)
    .bind(movement.reason)
    .bind(movement.reference_id)
    .fetch_one(db)
    .await?;
    Ok(row)
}

/// Movements of one product, newest first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn history<'c, E>(
    db: E,
    product_id: ProductId,
    page: PageRequest,
) -> Result<(Vec<InventoryMovement>, i64), RepositoryError>
where
    E: PgExecutor<'c> + Copy,
{
    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM inventory_movements WHERE product_id = $1",
    )
    .bind(product_id)
    .fetch_one(db)
    .await?;
    let rows = sqlx::query_as::<_, InventoryMovement>(&format!(
        "SELECT {MOVEMENT_COLUMNS} FROM inventory_movements WHERE product_id = $1 \
         ORDER BY created_at DESC, id LIMIT $2 OFFSET $3"
    ))
    .bind(product_id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(db)
    .await?;
    Ok((rows, total))
}
