//! The caller's cart.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post, put},
};
use serde::Deserialize;

use emporium_core::{CartItemId, ProductId};

use crate::error::Result;
use crate::middleware::RequireUser;
use crate::models::CartView;
use crate::services::cart::CartService;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(show).delete(clear))
        .route("/items", post(add_item))
        .route("/items/{id}", put(update_item).delete(remove_item))
        .route("/coupon", post(apply_coupon).delete(remove_coupon))
}

#[derive(Debug, Deserialize)]
pub struct AddItem {
    pub product_id: ProductId,
    #[serde(default = "one")]
    pub quantity: i32,
}

const fn one() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UpdateItem {
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct ApplyCoupon {
    pub code: String,
}

async fn show(RequireUser(user): RequireUser, State(state): State<AppState>) -> Result<Json<CartView>> {
    Ok(Json(CartService::new(&state).get(user.id).await?))
}

async fn clear(RequireUser(user): RequireUser, State(state): State<AppState>) -> Result<Json<CartView>> {
    Ok(Json(CartService::new(&state).clear(user.id).await?))
}

async fn add_item(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Json(body): Json<AddItem>,
) -> Result<Json<CartView>> {
    let cart = CartService::new(&state)
        .add_item(user.id, body.product_id, body.quantity)
        .await?;
    Ok(Json(cart))
}

async fn update_item(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Path(id): Path<CartItemId>,
    Json(body): Json<UpdateItem>,
) -> Result<Json<CartView>> {
    let cart = CartService::new(&state)
        .update_item(user.id, id, body.quantity)
        .await?;
    Ok(Json(cart))
}

async fn remove_item(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Path(id): Path<CartItemId>,
) -> Result<Json<CartView>> {
    Ok(Json(CartService::new(&state).remove_item(user.id, id).await?))
}

async fn apply_coupon(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Json(body): Json<ApplyCoupon>,
) -> Result<Json<CartView>> {
    Ok(Json(CartService::new(&state).apply_coupon(user.id, &body.code).await?))
}

async fn remove_coupon(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
) -> Result<Json<CartView>> {
    Ok(Json(CartService::new(&state).remove_coupon(user.id).await?))
}
