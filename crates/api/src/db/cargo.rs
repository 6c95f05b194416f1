//! Shipments and tracking events.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use emporium_core::{CargoId, CargoStatus, OrderId};

use super::{PgExecutor, RepositoryError, conflict_on_unique};
use crate::models::{Cargo, TrackingEvent};

const CARGO_COLUMNS: &str = "id, order_id, carrier, tracking_number, status, estimated_delivery, \
     shipped_at, delivered_at, created_at, updated_at";

const EVENT_COLUMNS: &str = "id, cargo_id, status, location, description, occurred_at";

/// Insert a shipment in `shipped` status.
///
/// Returns `None` when the tracking number is already taken.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the order already has a shipment.
pub async fn create(
    db: impl PgExecutor<'_>,
    order_id: OrderId,
    carrier: &str,
    tracking_number: &str,
    estimated_delivery: Option<DateTime<Utc>>,
) -> Result<Option<Cargo>, RepositoryError> {
    sqlx::query_as::<_, Cargo>(&format!(
        "INSERT INTO cargos (id, order_id, carrier, tracking_number, status, estimated_delivery, shipped_at) \
         VALUES ($1, $2, $3, $4, $5, $6, NOW()) \
         ON CONFLICT (tracking_number) DO NOTHING RETURNING {CARGO_COLUMNS}"
    ))
    .bind(CargoId::generate())
    .bind(order_id)
    .bind(carrier)
    .bind(tracking_number)
    .bind(CargoStatus::Shipped)
    .bind(estimated_delivery)
    .fetch_optional(db)
    .await
    .map_err(conflict_on_unique("order already has a shipment"))
}

/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn exists_for_order(db: impl PgExecutor<'_>, order_id: OrderId) -> Result<bool, RepositoryError> {
    let found = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM cargos WHERE order_id = $1)")
        .bind(order_id)
        .fetch_one(db)
        .await?;
    Ok(found)
}

/// Fetch and lock a shipment.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock(db: impl PgExecutor<'_>, id: CargoId) -> Result<Option<Cargo>, RepositoryError> {
    let row = sqlx::query_as::<_, Cargo>(&format!(
        "SELECT {CARGO_COLUMNS} FROM cargos WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get_by_tracking_number(
    db: impl PgExecutor<'_>,
    tracking_number: &str,
) -> Result<Option<Cargo>, RepositoryError> {
    let row = sqlx::query_as::<_, Cargo>(&format!(
        "SELECT {CARGO_COLUMNS} FROM cargos WHERE tracking_number = $1"
    ))
    .bind(tracking_number)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get_for_order(db: impl PgExecutor<'_>, order_id: OrderId) -> Result<Option<Cargo>, RepositoryError> {
    let row = sqlx::query_as::<_, Cargo>(&format!(
        "SELECT {CARGO_COLUMNS} FROM cargos WHERE order_id = $1"
    ))
    .bind(order_id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Move a shipment to `status`, stamping `delivered_at` on delivery.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the shipment does not exist.
pub async fn set_status(
    db: impl PgExecutor<'_>,
    id: CargoId,
    status: CargoStatus,
) -> Result<Cargo, RepositoryError> {
    sqlx::query_as::<_, Cargo>(&format!(
        "UPDATE cargos SET status = $2, \
             delivered_at = CASE WHEN $2 = 'delivered'::cargo_status THEN NOW() ELSE delivered_at END, \
             updated_at = NOW() \
         WHERE id = $1 RETURNING {CARGO_COLUMNS}"
    ))
    .bind(id)
    .bind(status)
    .fetch_optional(db)
    .await?
    .ok_or(RepositoryError::NotFound)
}

/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn add_event(
    db: impl PgExecutor<'_>,
    cargo_id: CargoId,
    status: CargoStatus,
    location: Option<&str>,
    description: &str,
) -> Result<TrackingEvent, RepositoryError> {
    let row = sqlx::query_as::<_, TrackingEvent>(&format!(
        "INSERT INTO cargo_tracking_events (id, cargo_id, status, location, description) \
         VALUES ($1, $2, $3, $4, $5) RETURNING {EVENT_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(cargo_id)
    .bind(status)
    .bind(location)
    .bind(description)
    .fetch_one(db)
    .await?;
    Ok(row)
}

/// Events of a shipment, oldest first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn events(db: impl PgExecutor<'_>, cargo_id: CargoId) -> Result<Vec<TrackingEvent>, RepositoryError> {
    let rows = sqlx::query_as::<_, TrackingEvent>(&format!(
        "SELECT {EVENT_COLUMNS} FROM cargo_tracking_events WHERE cargo_id = $1 ORDER BY occurred_at, id"
    ))
    .bind(cargo_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}
