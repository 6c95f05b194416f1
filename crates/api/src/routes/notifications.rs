//! In-app notifications.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};

use emporium_core::{NotificationId, Page, PageRequest};

use crate::error::Result;
use crate::middleware::{RequireAdmin, RequireUser};
use crate::models::Notification;
use crate::services::notification::{BroadcastReport, NotificationService, UnreadCount};
use crate::state::AppState;

/// Mounted under `/api/notifications`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/unread-count", get(unread_count))
        .route("/read-all", post(mark_all_read))
        .route("/{id}", delete(remove))
        .route("/{id}/read", post(mark_read))
}

/// Mounted under `/api/admin/notifications`.
pub fn admin_router() -> Router<AppState> {
    Router::new().route("/broadcast", post(broadcast))
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationFilter {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub title: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub updated: u64,
}

async fn list(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Query(filter): Query<NotificationFilter>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<Notification>>> {
    let notifications = NotificationService::new(state.pool())
        .list(user.id, filter.unread_only, page)
        .await?;
    Ok(Json(notifications))
}

async fn unread_count(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
) -> Result<Json<UnreadCount>> {
    Ok(Json(NotificationService::new(state.pool()).unread_count(user.id).await?))
}

async fn mark_read(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Path(id): Path<NotificationId>,
) -> Result<StatusCode> {
    NotificationService::new(state.pool()).mark_read(user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn mark_all_read(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
) -> Result<Json<MarkedRead>> {
    let updated = NotificationService::new(state.pool()).mark_all_read(user.id).await?;
    Ok(Json(MarkedRead { updated }))
}

async fn remove(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Path(id): Path<NotificationId>,
) -> Result<StatusCode> {
    NotificationService::new(state.pool()).delete(user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn broadcast(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Json(body): Json<BroadcastRequest>,
) -> Result<Json<BroadcastReport>> {
    let report = NotificationService::new(state.pool())
        .broadcast(&body.title, &body.message)
        .await?;
    Ok(Json(report))
}
