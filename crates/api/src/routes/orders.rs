//! Order placement, history, and admin status changes.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use serde::Deserialize;

use emporium_core::{OrderId, OrderStatus, Page, PageRequest};

use crate::error::Result;
use crate::middleware::{RequireAdmin, RequireUser};
use crate::models::cargo::CargoTracking;
use crate::models::order::OrderDetail;
use crate::models::{Order, Payment};
use crate::services::cargo::CargoService;
use crate::services::order::{OrderService, PlaceOrder, StatusUpdate};
use crate::services::payment::PaymentService;
use crate::state::AppState;

/// Mounted under `/api/orders`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_mine).post(place))
        .route("/{id}", get(show_mine))
        .route("/{id}/cancel", post(cancel))
        .route("/{id}/payments", get(payments))
        .route("/{id}/cargo", get(cargo))
}

/// Mounted under `/api/admin/orders`.
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_all))
        .route("/{id}", get(show_any))
        .route("/{id}/status", put(update_status))
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
}

async fn place(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Json(body): Json<PlaceOrder>,
) -> Result<(StatusCode, Json<OrderDetail>)> {
    let order = OrderService::new(&state).place_order(user.id, body).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn list_mine(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<Order>>> {
    Ok(Json(OrderService::new(&state).list_mine(user.id, page).await?))
}

async fn show_mine(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderDetail>> {
    let service = OrderService::new(&state);
    let order = if user.is_admin() {
        service.get(id).await?
    } else {
        service.get_mine(user.id, id).await?
    };
    Ok(Json(order))
}

async fn cancel(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    Ok(Json(OrderService::new(&state).cancel_mine(user.id, id).await?))
}

async fn payments(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Json<Vec<Payment>>> {
    let payments = PaymentService::new(&state)
        .list_for_order(id, user.owner_scope())
        .await?;
    Ok(Json(payments))
}

async fn cargo(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Json<CargoTracking>> {
    let tracking = CargoService::new(&state)
        .get_for_order(id, user.owner_scope())
        .await?;
    Ok(Json(tracking))
}

async fn list_all(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Query(filter): Query<OrderFilter>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<Order>>> {
    Ok(Json(OrderService::new(&state).list_all(filter.status, page).await?))
}

async fn show_any(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderDetail>> {
    Ok(Json(OrderService::new(&state).get(id).await?))
}

async fn update_status(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Json(body): Json<StatusUpdate>,
) -> Result<Json<Order>> {
    tracing::info!(admin_id = %admin.id, %id, status = %body.status, "Admin order status change");
    Ok(Json(OrderService::new(&state).update_status(id, body.status).await?))
}
