//! Payments.

use rust_decimal::Decimal;

use emporium_core::{OrderId, PaymentId, PaymentMethod, PaymentStatus};

use super::{PgExecutor, RepositoryError, conflict_on_unique};
use crate::models::Payment;

const PAYMENT_COLUMNS: &str = "id, order_id, amount, method, status, provider_reference, \
     failure_reason, refunded_amount, created_at, updated_at";

/// Insert a pending payment.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the order already has a payment
/// that is not failed.
pub async fn create_pending(
    db: impl PgExecutor<'_>,
    order_id: OrderId,
    amount: Decimal,
    method: PaymentMethod,
) -> Result<Payment, RepositoryError> {
    let row = sqlx::query_as::<_, Payment>(&format!(
        "INSERT INTO payments (id, order_id, amount, method) VALUES ($1, $2, $3, $4) \
         RETURNING {PAYMENT_COLUMNS}"
    ))
    .bind(PaymentId::generate())
    .bind(order_id)
    .bind(amount)
    .bind(method)
    .fetch_one(db)
    .await
    .map_err(conflict_on_unique("order already has an active payment"))?;
    Ok(row)
}

/// Record the gateway outcome of a pending payment.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the payment does not exist.
pub async fn settle(
    db: impl PgExecutor<'_>,
    id: PaymentId,
    status: PaymentStatus,
    provider_reference: Option<&str>,
    failure_reason: Option<&str>,
) -> Result<Payment, RepositoryError> {
    sqlx::query_as::<_, Payment>(&format!(
        "UPDATE payments SET status = $2, provider_reference = $3, failure_reason = $4, updated_at = NOW() \
         WHERE id = $1 RETURNING {PAYMENT_COLUMNS}"
    ))
    .bind(id)
    .bind(status)
    .bind(provider_reference)
    .bind(failure_reason)
    .fetch_optional(db)
    .await?
    .ok_or(RepositoryError::NotFound)
}

/// # Errors
///
/// Returns `RepositoryError::NotFound` if the payment does not exist.
pub async fn record_refund(
    db: impl PgExecutor<'_>,
    id: PaymentId,
    refunded_amount: Decimal,
    status: PaymentStatus,
) -> Result<Payment, RepositoryError> {
    sqlx::query_as::<_, Payment>(&format!(
        "UPDATE payments SET refunded_amount = $2, status = $3, updated_at = NOW() \
         WHERE id = $1 RETURNING {PAYMENT_COLUMNS}"
    ))
    .bind(id)
    .bind(refunded_amount)
    .bind(status)
    .fetch_optional(db)
    .await?
    .ok_or(RepositoryError::NotFound)
}

/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get(db: impl PgExecutor<'_>, id: PaymentId) -> Result<Option<Payment>, RepositoryError> {
    let row = sqlx::query_as::<_, Payment>(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(row)
}

/// Fetch and lock a payment row.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock(db: impl PgExecutor<'_>, id: PaymentId) -> Result<Option<Payment>, RepositoryError> {
    let row = sqlx::query_as::<_, Payment>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Payments of an order, oldest first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list_for_order(
    db: impl PgExecutor<'_>,
    order_id: OrderId,
) -> Result<Vec<Payment>, RepositoryError> {
    let rows = sqlx::query_as::<_, Payment>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1 ORDER BY created_at, id"
    ))
    .bind(order_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Status of the payment that blocks a new charge on the order, if any.
///
/// A settled payment wins over one still in flight.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn blocking_status(
    db: impl PgExecutor<'_>,
    order_id: OrderId,
) -> Result<Option<PaymentStatus>, RepositoryError> {
    let status = sqlx::query_scalar::<_, PaymentStatus>(
        "SELECT status FROM payments WHERE order_id = $1 AND status <> 'failed' \
         ORDER BY (status = 'pending'), created_at LIMIT 1",
    )
    .bind(order_id)
    .fetch_optional(db)
    .await?;
    Ok(status)
}
