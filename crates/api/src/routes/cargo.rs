//! Shipments: admin creation and events, public tracking.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};

use emporium_core::CargoId;

use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::models::cargo::CargoTracking;
use crate::services::cargo::{CargoService, CreateShipment, NewTrackingEvent};
use crate::state::AppState;

/// Mounted under `/api/cargo`.
pub fn router() -> Router<AppState> {
    Router::new().route("/track/{tracking_number}", get(track))
}

/// Mounted under `/api/admin/cargo`.
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create))
        .route("/{id}/events", post(add_event))
}

async fn track(
    State(state): State<AppState>,
    Path(tracking_number): Path<String>,
) -> Result<Json<CargoTracking>> {
    Ok(Json(CargoService::new(&state).track(&tracking_number).await?))
}

async fn create(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Json(body): Json<CreateShipment>,
) -> Result<(StatusCode, Json<CargoTracking>)> {
    let tracking = CargoService::new(&state).create_shipment(&body).await?;
    Ok((StatusCode::CREATED, Json(tracking)))
}

async fn add_event(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<CargoId>,
    Json(body): Json<NewTrackingEvent>,
) -> Result<Json<CargoTracking>> {
    Ok(Json(CargoService::new(&state).add_tracking_event(id, &body).await?))
}
