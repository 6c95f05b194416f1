//! Review edits, helpful votes, and moderation.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};

use emporium_core::{Page, PageRequest, ReviewId};

use crate::error::Result;
use crate::middleware::{RequireAdmin, RequireUser};
use crate::models::Review;
use crate::services::review::{HelpfulCount, ReviewInput, ReviewService};
use crate::state::AppState;

/// Mounted under `/api/reviews`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", put(update).delete(remove))
        .route("/{id}/helpful", post(helpful))
}

/// Mounted under `/api/admin/reviews`.
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/pending", get(pending))
        .route("/{id}/approve", post(approve))
}

async fn update(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Path(id): Path<ReviewId>,
    Json(input): Json<ReviewInput>,
) -> Result<Json<Review>> {
    Ok(Json(ReviewService::new(&state).update(user.id, id, &input).await?))
}

async fn remove(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Path(id): Path<ReviewId>,
) -> Result<StatusCode> {
    ReviewService::new(&state).delete(user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn helpful(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Path(id): Path<ReviewId>,
) -> Result<Json<HelpfulCount>> {
    Ok(Json(ReviewService::new(&state).mark_helpful(user.id, id).await?))
}

async fn pending(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<Review>>> {
    Ok(Json(ReviewService::new(&state).list_pending(page).await?))
}

async fn approve(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ReviewId>,
) -> Result<Json<Review>> {
    Ok(Json(ReviewService::new(&state).approve(id).await?))
}
