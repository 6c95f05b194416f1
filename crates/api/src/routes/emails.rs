//! Admin email maintenance.

use axum::{Json, Router, extract::State, routing::post};

use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::services::email::RetryReport;
use crate::state::AppState;

/// Mounted under `/api/admin/emails`.
pub fn admin_router() -> Router<AppState> {
    Router::new().route("/retry", post(retry))
}

async fn retry(_admin: RequireAdmin, State(state): State<AppState>) -> Result<Json<RetryReport>> {
    let report = state
        .email()
        .retry_failed(state.pool())
        .await
        .map_err(|e| AppError::Internal(format!("email retry failed: {e}")))?;
    tracing::info!(attempted = report.attempted, sent = report.sent, failed = report.failed, "Email retry sweep");
    Ok(Json(report))
}
