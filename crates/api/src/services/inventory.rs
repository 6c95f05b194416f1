//! Manual stock adjustments and the movement ledger.

use serde::Deserialize;
use tracing::instrument;

use emporium_core::{MovementType, Page, PageRequest, ProductId};

use crate::db::inventory::NewMovement;
use crate::db::{UnitOfWork, inventory, products};
use crate::error::{AppError, Result};
use crate::models::inventory::{apply_stock_change, sign_is_valid};
use crate::models::{InventoryMovement, Product};
use crate::services::product::invalidate_product;
use crate::state::AppState;

/// Body of `POST /api/admin/inventory/{product_id}/adjust`.
#[derive(Debug, Clone, Deserialize)]
pub struct StockAdjustment {
    pub change: i32,
    #[serde(default = "default_movement")]
    pub movement_type: MovementType,
    pub reason: Option<String>,
}

const fn default_movement() -> MovementType {
    MovementType::Adjustment
}

impl StockAdjustment {
    fn validate(&self) -> Result<()> {
        if sign_is_valid(self.movement_type, self.change) {
            return Ok(());
        }
        Err(AppError::validation(match self.movement_type {
            MovementType::Restock | MovementType::Return => {
                format!("a {} must add stock", self.movement_type)
            }
            MovementType::Sale => "a sale must remove stock".to_string(),
            MovementType::Adjustment => "an adjustment must change stock".to_string(),
        }))
    }
}

pub struct InventoryService<'a> {
    state: &'a AppState,
}

impl<'a> InventoryService<'a> {
    #[must_use]
    pub const fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Apply a stock change and record it.
    ///
    /// # Errors
    ///
    /// Returns `INSUFFICIENT_STOCK` when the result would be negative and
    /// `AppError::Validation` when the sign does not fit the movement type.
    #[instrument(skip(self, adjustment), fields(change = adjustment.change))]
    pub async fn adjust(
        &self,
        product_id: ProductId,
        adjustment: &StockAdjustment,
    ) -> Result<InventoryMovement> {
        adjustment.validate()?;
        let reason = adjustment
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty());

        let mut uow = UnitOfWork::begin(self.state.pool()).await?;
        let product = products::lock_for_update(uow.conn(), &[product_id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::not_found("product not found"))?;
        let after = apply_stock_change(product.stock_quantity, adjustment.change)
            .map_err(|e| AppError::rule("INSUFFICIENT_STOCK", e.to_string()))?;

        products::set_stock(uow.conn(), product_id, after).await?;
        let movement = inventory::record(
            uow.conn(),
            &NewMovement {
                product_id,
                movement_type: adjustment.movement_type,
                quantity_change: adjustment.change,
                quantity_after: after,
                reason,
                reference_id: None,
            },
        )
        .await?;
        uow.commit().await?;

        tracing::info!(
            %product_id,
            before = product.stock_quantity,
            after,
            movement = %adjustment.movement_type,
            "Stock adjusted"
        );
        if product.stock_quantity == 0 && after > 0 {
            tracing::debug!(%product_id, "Product back in stock");
        }
        invalidate_product(
            self.state,
            &Product {
                stock_quantity: after,
                ..product
            },
        )
        .await;
        Ok(movement)
    }

    /// Newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown product.
    pub async fn history(
        &self,
        product_id: ProductId,
        page: PageRequest,
    ) -> Result<Page<InventoryMovement>> {
        let pool = self.state.pool();
        products::get_plain(pool, product_id)
            .await?
            .ok_or_else(|| AppError::not_found("product not found"))?;
        let (items, total) = inventory::history(pool, product_id, page).await?;
        Ok(Page::new(items, page, total))
    }

    /// Active products at or below their threshold.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if the query fails.
    pub async fn low_stock(&self) -> Result<Vec<Product>> {
        Ok(products::low_stock(self.state.pool()).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn adjustment(movement_type: MovementType, change: i32) -> StockAdjustment {
        StockAdjustment {
            change,
            movement_type,
            reason: None,
        }
    }

    #[test]
    fn test_sign_validation() {
        assert!(adjustment(MovementType::Restock, 5).validate().is_ok());
        assert!(adjustment(MovementType::Restock, -5).validate().is_err());
        assert!(adjustment(MovementType::Sale, 1).validate().is_err());
        assert!(adjustment(MovementType::Adjustment, 0).validate().is_err());
        assert!(adjustment(MovementType::Adjustment, -3).validate().is_ok());
    }

    #[test]
    fn test_movement_type_defaults_to_adjustment() {
        let parsed: StockAdjustment =
            serde_json::from_value(serde_json::json!({ "change": -2 })).unwrap();
        assert_eq!(parsed.movement_type, MovementType::Adjustment);
    }
}
