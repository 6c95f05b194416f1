//! Wishlist and the admin change sweeps.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, post},
};

use emporium_core::ProductId;

use crate::error::Result;
use crate::middleware::{RequireAdmin, RequireUser};
use crate::models::CartView;
use crate::models::wishlist::SweepReport;
use crate::services::wishlist::{AddToWishlist, WishlistService, WishlistView};
use crate::state::AppState;

/// Mounted under `/api/wishlist`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(show).delete(clear))
        .route("/items", post(add))
        .route("/items/{product_id}", delete(remove))
        .route("/items/{product_id}/move-to-cart", post(move_to_cart))
}

/// Mounted under `/api/admin/wishlists`.
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/check-prices", post(check_prices))
        .route("/check-stock", post(check_stock))
}

async fn show(RequireUser(user): RequireUser, State(state): State<AppState>) -> Result<Json<WishlistView>> {
    Ok(Json(WishlistService::new(&state).get(user.id).await?))
}

async fn clear(RequireUser(user): RequireUser, State(state): State<AppState>) -> Result<Json<WishlistView>> {
    Ok(Json(WishlistService::new(&state).clear(user.id).await?))
}

async fn add(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Json(body): Json<AddToWishlist>,
) -> Result<Json<WishlistView>> {
    Ok(Json(WishlistService::new(&state).add(user.id, body).await?))
}

async fn remove(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Path(product_id): Path<ProductId>,
) -> Result<Json<WishlistView>> {
    Ok(Json(WishlistService::new(&state).remove(user.id, product_id).await?))
}

async fn move_to_cart(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Path(product_id): Path<ProductId>,
) -> Result<Json<CartView>> {
    let cart = WishlistService::new(&state)
        .move_to_cart(user.id, product_id)
        .await?;
    Ok(Json(cart))
}

async fn check_prices(_admin: RequireAdmin, State(state): State<AppState>) -> Result<Json<SweepReport>> {
    Ok(Json(WishlistService::new(&state).check_price_changes().await?))
}

async fn check_stock(_admin: RequireAdmin, State(state): State<AppState>) -> Result<Json<SweepReport>> {
    Ok(Json(WishlistService::new(&state).check_stock_changes().await?))
}
