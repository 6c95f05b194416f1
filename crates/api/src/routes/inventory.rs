//! Admin stock adjustments and reports.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};

use emporium_core::{Page, PageRequest, ProductId};

use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::models::{InventoryMovement, Product};
use crate::services::inventory::{InventoryService, StockAdjustment};
use crate::state::AppState;

/// Mounted under `/api/admin/inventory`.
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/low-stock", get(low_stock))
        .route("/{product_id}/adjust", post(adjust))
        .route("/{product_id}/history", get(history))
}

async fn adjust(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(product_id): Path<ProductId>,
    Json(body): Json<StockAdjustment>,
) -> Result<Json<InventoryMovement>> {
    tracing::info!(admin_id = %admin.id, %product_id, "Manual stock adjustment");
    Ok(Json(InventoryService::new(&state).adjust(product_id, &body).await?))
}

async fn history(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(product_id): Path<ProductId>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<InventoryMovement>>> {
    Ok(Json(InventoryService::new(&state).history(product_id, page).await?))
}

async fn low_stock(_admin: RequireAdmin, State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    Ok(Json(InventoryService::new(&state).low_stock().await?))
}
