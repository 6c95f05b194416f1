//! Category tree and admin maintenance.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};

use emporium_core::CategoryId;

use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::models::{Category, CategoryNode};
use crate::services::category::{CategoryInput, CategoryService};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/tree", get(tree))
        .route("/{id}", get(show).put(update).delete(remove))
}

async fn list(State(state): State<AppState>) -> Result<Json<Vec<Category>>> {
    Ok(Json(CategoryService::new(&state).list().await?))
}

async fn tree(State(state): State<AppState>) -> Result<Json<Vec<CategoryNode>>> {
    Ok(Json(CategoryService::new(&state).tree().await?))
}

async fn show(State(state): State<AppState>, Path(id): Path<CategoryId>) -> Result<Json<Category>> {
    Ok(Json(CategoryService::new(&state).get(id).await?))
}

async fn create(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<CategoryInput>,
) -> Result<(StatusCode, Json<Category>)> {
    let category = CategoryService::new(&state).create(input).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn update(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
    Json(input): Json<CategoryInput>,
) -> Result<Json<Category>> {
    Ok(Json(CategoryService::new(&state).update(id, input).await?))
}

async fn remove(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
) -> Result<StatusCode> {
    CategoryService::new(&state).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
