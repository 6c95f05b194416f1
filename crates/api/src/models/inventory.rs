//! Stock movements.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use emporium_core::{MovementType, ProductId};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct InventoryMovement {
    pub id: Uuid,
    pub product_id: ProductId,
    pub movement_type: MovementType,
    pub quantity_change: i32,
    pub quantity_after: i32,
    pub reason: Option<String>,
    /// Order or other entity that caused the movement.
    pub reference_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Requested change would take stock below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("insufficient stock: {available} available, change of {change} requested")]
pub struct InsufficientStock {
    pub available: i32,
    pub change: i32,
}

/// New stock level after applying `change`.
///
/// # Errors
///
/// Returns [`InsufficientStock`] when the result would be negative or overflow.
pub fn apply_stock_change(current: i32, change: i32) -> Result<i32, InsufficientStock> {
    current
        .checked_add(change)
        .filter(|after| *after >= 0)
        .ok_or(InsufficientStock {
            available: current,
            change,
        })
}

/// Movements whose sign is fixed by their type.
#[must_use]
pub const fn sign_is_valid(movement_type: MovementType, change: i32) -> bool {
    match movement_type {
        MovementType::Restock | MovementType::Return => change > 0,
        MovementType::Sale => change < 0,
        MovementType::Adjustment => change != 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_stock_change() {
        assert_eq!(apply_stock_change(5, 3), Ok(8));
        assert_eq!(apply_stock_change(5, -5), Ok(0));
        assert_eq!(
            apply_stock_change(2, -3),
            Err(InsufficientStock {
                available: 2,
                change: -3
            })
        );
        assert!(apply_stock_change(i32::MAX, 1).is_err());
    }

    #[test]
    fn test_sign_rules() {
        assert!(sign_is_valid(MovementType::Restock, 10));
        assert!(!sign_is_valid(MovementType::Restock, -1));
        assert!(sign_is_valid(MovementType::Sale, -2));
        assert!(!sign_is_valid(MovementType::Sale, 2));
        assert!(sign_is_valid(MovementType::Adjustment, -4));
        assert!(!sign_is_valid(MovementType::Adjustment, 0));
    }
}
