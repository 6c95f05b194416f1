//! Wishlists and change detection against product snapshots.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use emporium_core::{ProductId, UserId, WishlistId, WishlistItemId};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Wishlist {
    pub id: WishlistId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// A wishlist item joined with its owner and the live product row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WishlistItemSnapshot {
    pub item_id: WishlistItemId,
    pub wishlist_id: WishlistId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub product_name: String,
    pub product_slug: String,
    pub image_url: Option<String>,
    pub price_at_add: Decimal,
    pub last_known_price: Decimal,
    pub was_in_stock: bool,
    pub notify_on_price_drop: bool,
    pub notify_on_back_in_stock: bool,
    pub current_price: Decimal,
    pub current_stock: i32,
    pub added_at: DateTime<Utc>,
}

/// What changed between the stored snapshot and the live product.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WishlistChange {
    /// `(old, new)` when the price dropped and the owner asked to hear about it.
    pub price_drop: Option<(Decimal, Decimal)>,
    /// Sold out before, in stock now, and the owner asked to hear about it.
    pub back_in_stock: bool,
    /// Price changed in either direction.
    pub price_changed: bool,
    /// Stock availability flipped in either direction.
    pub stock_changed: bool,
}

impl WishlistChange {
    /// Whether the stored snapshot needs refreshing.
    #[must_use]
    pub const fn snapshot_dirty(&self) -> bool {
        self.price_changed || self.stock_changed
    }
}

impl WishlistItemSnapshot {
    #[must_use]
    pub const fn is_in_stock(&self) -> bool {
        self.current_stock > 0
    }

    /// Compare the snapshot to the live product.
    #[must_use]
    pub fn detect_change(&self) -> WishlistChange {
        let in_stock = self.is_in_stock();
        let dropped = self.current_price < self.last_known_price;
        WishlistChange {
            price_drop: (dropped && self.notify_on_price_drop)
                .then_some((self.last_known_price, self.current_price)),
            back_in_stock: !self.was_in_stock && in_stock && self.notify_on_back_in_stock,
            price_changed: self.current_price != self.last_known_price,
            stock_changed: self.was_in_stock != in_stock,
        }
    }
}

/// Counts reported by a wishlist sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub checked: usize,
    pub updated: usize,
    pub notified: usize,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn snapshot(last: &str, current: &str, was_in_stock: bool, stock: i32) -> WishlistItemSnapshot {
        WishlistItemSnapshot {
            item_id: WishlistItemId::generate(),
            wishlist_id: WishlistId::generate(),
            user_id: UserId::generate(),
            product_id: ProductId::generate(),
            product_name: "Desk Lamp".to_string(),
            product_slug: "desk-lamp".to_string(),
            image_url: None,
            price_at_add: dec(last),
            last_known_price: dec(last),
            was_in_stock,
            notify_on_price_drop: true,
            notify_on_back_in_stock: true,
            current_price: dec(current),
            current_stock: stock,
            added_at: Utc::now(),
        }
    }

    #[test]
    fn test_price_drop_detected() {
        let change = snapshot("50.00", "40.00", true, 3).detect_change();
        assert_eq!(change.price_drop, Some((dec("50.00"), dec("40.00"))));
        assert!(!change.back_in_stock);
        assert!(change.snapshot_dirty());
    }

    #[test]
    fn test_price_increase_updates_without_notifying() {
        let change = snapshot("40.00", "50.00", true, 3).detect_change();
        assert_eq!(change.price_drop, None);
        assert!(change.price_changed);
        assert!(change.snapshot_dirty());
    }

    #[test]
    fn test_price_drop_respects_opt_out() {
        let mut s = snapshot("50.00", "40.00", true, 3);
        s.notify_on_price_drop = false;
        let change = s.detect_change();
        assert_eq!(change.price_drop, None);
        assert!(change.snapshot_dirty());
    }

    #[test]
    fn test_back_in_stock_only_on_transition() {
        assert!(snapshot("10.00", "10.00", false, 2).detect_change().back_in_stock);
        assert!(!snapshot("10.00", "10.00", true, 2).detect_change().back_in_stock);
        assert!(!snapshot("10.00", "10.00", false, 0).detect_change().back_in_stock);

        let going_out = snapshot("10.00", "10.00", true, 0).detect_change();
        assert!(!going_out.back_in_stock);
        assert!(going_out.stock_changed);
    }

    #[test]
    fn test_unchanged_snapshot_is_clean() {
        assert!(!snapshot("10.00", "10.00", true, 5).detect_change().snapshot_dirty());
    }
}
