//! Catalog reads, admin product maintenance, and product reviews.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;

use emporium_core::{CategoryId, Page, PageRequest, ProductId};

use crate::error::Result;
use crate::middleware::{AuthUser, OptionalUser, RequireAdmin, RequireUser};
use crate::models::review::ProductReviews;
use crate::models::{Product, ProductView, Review};
use crate::services::product::{ProductInput, ProductService};
use crate::services::review::{ReviewInput, ReviewService};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/slug/{slug}", get(show_by_slug))
        .route("/{id}", get(show).put(update).delete(remove))
        .route("/{id}/reviews", get(reviews).post(review))
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductFilter {
    pub category_id: Option<CategoryId>,
}

async fn list(
    State(state): State<AppState>,
    Query(filter): Query<ProductFilter>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<ProductView>>> {
    let products = ProductService::new(&state).list(filter.category_id, page).await?;
    Ok(Json(products))
}

/// Admins also see inactive products.
async fn show(
    OptionalUser(user): OptionalUser,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<ProductView>> {
    let service = ProductService::new(&state);
    let product = if user.as_ref().is_some_and(AuthUser::is_admin) {
        service.get_any(id).await?
    } else {
        service.get(id).await?
    };
    Ok(Json(product))
}

async fn show_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<ProductView>> {
    Ok(Json(ProductService::new(&state).get_by_slug(&slug).await?))
}

async fn create(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<ProductInput>,
) -> Result<(StatusCode, Json<Product>)> {
    let product = ProductService::new(&state).create(input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    Json(input): Json<ProductInput>,
) -> Result<Json<Product>> {
    Ok(Json(ProductService::new(&state).update(id, input).await?))
}

async fn remove(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<StatusCode> {
    ProductService::new(&state).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reviews(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    Query(page): Query<PageRequest>,
) -> Result<Json<ProductReviews>> {
    Ok(Json(ReviewService::new(&state).list_for_product(id, page).await?))
}

async fn review(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    Json(input): Json<ReviewInput>,
) -> Result<(StatusCode, Json<Review>)> {
    let review = ReviewService::new(&state).create(user.id, id, &input).await?;
    Ok((StatusCode::CREATED, Json(review)))
}
