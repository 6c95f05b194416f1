//! Charges and refunds.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};

use emporium_core::PaymentId;

use crate::error::Result;
use crate::middleware::{RequireAdmin, RequireUser};
use crate::models::Payment;
use crate::services::payment::{PayOrder, PaymentService, RefundRequest};
use crate::state::AppState;

/// Mounted under `/api/payments`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(pay))
        .route("/{id}", get(show))
}

/// Mounted under `/api/admin/payments`.
pub fn admin_router() -> Router<AppState> {
    Router::new().route("/{id}/refund", post(refund))
}

async fn pay(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Json(body): Json<PayOrder>,
) -> Result<(StatusCode, Json<Payment>)> {
    let payment = PaymentService::new(&state).pay(user.id, body).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

async fn show(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Path(id): Path<PaymentId>,
) -> Result<Json<Payment>> {
    Ok(Json(PaymentService::new(&state).get(id, user.owner_scope()).await?))
}

async fn refund(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<PaymentId>,
    Json(body): Json<RefundRequest>,
) -> Result<Json<Payment>> {
    Ok(Json(PaymentService::new(&state).refund(id, body).await?))
}
