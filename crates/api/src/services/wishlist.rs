//! Wishlists and the price-drop / back-in-stock sweeps.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use emporium_core::{NotificationKind, ProductId, UserId, WishlistId};

use crate::db::wishlists::{self, NotifyFlags};
use crate::db::{RepositoryError, products};
use crate::error::{AppError, Result};
use crate::models::wishlist::SweepReport;
use crate::models::{CartView, NewNotification, WishlistChange, WishlistItemSnapshot};
use crate::services::cart::CartService;
use crate::services::notification::notify_quietly;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct WishlistView {
    pub id: WishlistId,
    pub items: Vec<WishlistItemSnapshot>,
}

/// Body of `POST /api/wishlist/items`.
#[derive(Debug, Clone, Deserialize)]
pub struct AddToWishlist {
    pub product_id: ProductId,
    #[serde(default = "default_true")]
    pub notify_on_price_drop: bool,
    #[serde(default = "default_true")]
    pub notify_on_back_in_stock: bool,
}

const fn default_true() -> bool {
    true
}

/// Which change a sweep reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sweep {
    Price,
    Stock,
}

/// The notification a detected change produces for `sweep`, if any.
fn sweep_notification(
    sweep: Sweep,
    item: &WishlistItemSnapshot,
    change: &WishlistChange,
) -> Option<NewNotification> {
    let notification = match sweep {
        Sweep::Price => {
            let (old, new) = change.price_drop?;
            NewNotification::new(
                item.user_id,
                NotificationKind::PriceDrop,
                format!("Price drop on {}", item.product_name),
                format!("{} dropped from {old} to {new}.", item.product_name),
            )
        }
        Sweep::Stock => {
            if !change.back_in_stock {
                return None;
            }
            NewNotification::new(
                item.user_id,
                NotificationKind::BackInStock,
                format!("{} is back in stock", item.product_name),
                format!("{} on your wishlist is available again.", item.product_name),
            )
        }
    };
    Some(notification.with_reference(item.product_id))
}

/// Whether `sweep` owns the snapshot field that changed.
const fn sweep_touches(sweep: Sweep, change: &WishlistChange) -> bool {
    match sweep {
        Sweep::Price => change.price_changed,
        Sweep::Stock => change.stock_changed,
    }
}

pub struct WishlistService<'a> {
    state: &'a AppState,
}

impl<'a> WishlistService<'a> {
    #[must_use]
    pub const fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// # Errors
    ///
    /// Returns `AppError::Database` if a query fails.
    pub async fn get(&self, user_id: UserId) -> Result<WishlistView> {
        let pool = self.state.pool();
        let wishlist = wishlists::get_or_create(pool, user_id).await?;
        let items = wishlists::items(pool, wishlist.id).await?;
        Ok(WishlistView {
            id: wishlist.id,
            items,
        })
    }

    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown product and
    /// `ALREADY_IN_WISHLIST` when it is already saved.
    #[instrument(skip(self))]
    pub async fn add(&self, user_id: UserId, request: AddToWishlist) -> Result<WishlistView> {
        let pool = self.state.pool();
        let product = products::get_plain(pool, request.product_id)
            .await?
            .ok_or_else(|| AppError::not_found("product not found"))?;
        let wishlist = wishlists::get_or_create(pool, user_id).await?;
        if wishlists::contains(pool, wishlist.id, product.id).await? {
            return Err(already_in_wishlist());
        }

        wishlists::add_item(
            pool,
            wishlist.id,
            product.id,
            product.price,
            product.is_in_stock(),
            NotifyFlags {
                on_price_drop: request.notify_on_price_drop,
                on_back_in_stock: request.notify_on_back_in_stock,
            },
        )
        .await
        .map_err(|e| match e {
            RepositoryError::Conflict(_) => already_in_wishlist(),
            other => other.into(),
        })?;
        self.get(user_id).await
    }

    /// # Errors
    ///
    /// Returns `AppError::Database` (not found) if the product is not saved.
    pub async fn remove(&self, user_id: UserId, product_id: ProductId) -> Result<WishlistView> {
        let pool = self.state.pool();
        let wishlist = wishlists::get_or_create(pool, user_id).await?;
        wishlists::remove_item(pool, wishlist.id, product_id).await?;
        self.get(user_id).await
    }

    /// # Errors
    ///
    /// Returns `AppError::Database` if the delete fails.
    pub async fn clear(&self, user_id: UserId) -> Result<WishlistView> {
        let pool = self.state.pool();
        let wishlist = wishlists::get_or_create(pool, user_id).await?;
        let removed = wishlists::clear(pool, wishlist.id).await?;
        tracing::debug!(removed, "Wishlist cleared");
        self.get(user_id).await
    }

    /// Add one unit to the cart, then drop the wishlist entry.
    ///
    /// # Errors
    ///
    /// Returns the cart's errors (for example `INSUFFICIENT_STOCK`) and leaves
    /// the wishlist untouched when the product cannot be added.
    #[instrument(skip(self))]
    pub async fn move_to_cart(&self, user_id: UserId, product_id: ProductId) -> Result<CartView> {
        let pool = self.state.pool();
        let wishlist = wishlists::get_or_create(pool, user_id).await?;
        if !wishlists::contains(pool, wishlist.id, product_id).await? {
            return Err(AppError::not_found("product is not on the wishlist"));
        }
        let cart = CartService::new(self.state)
            .add_item(user_id, product_id, 1)
            .await?;
        wishlists::remove_item(pool, wishlist.id, product_id).await?;
        Ok(cart)
    }

    /// Notify owners of price drops and refresh price snapshots.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if loading or updating snapshots fails.
    #[instrument(skip(self))]
    pub async fn check_price_changes(&self) -> Result<SweepReport> {
        self.sweep(Sweep::Price).await
    }

    /// Notify owners of restocked products and refresh stock snapshots.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if loading or updating snapshots fails.
    #[instrument(skip(self))]
    pub async fn check_stock_changes(&self) -> Result<SweepReport> {
        self.sweep(Sweep::Stock).await
    }

    async fn sweep(&self, sweep: Sweep) -> Result<SweepReport> {
        let pool = self.state.pool();
        let snapshots = wishlists::all_snapshots(pool).await?;
        let mut report = SweepReport {
            checked: snapshots.len(),
            ..SweepReport::default()
        };

        for item in &snapshots {
            let change = item.detect_change();
            if !sweep_touches(sweep, &change) {
                continue;
            }
            if let Some(notification) = sweep_notification(sweep, item, &change) {
                notify_quietly(pool, &notification).await;
                report.notified += 1;
            }

            // Each sweep refreshes only its own half of the snapshot.
            let (price, in_stock) = match sweep {
                Sweep::Price => (item.current_price, item.was_in_stock),
                Sweep::Stock => (item.last_known_price, item.is_in_stock()),
            };
            wishlists::update_snapshot(pool, item.item_id, price, in_stock).await?;
            report.updated += 1;
        }

        tracing::info!(
            ?sweep,
            checked = report.checked,
            updated = report.updated,
            notified = report.notified,
            "Wishlist sweep finished"
        );
        Ok(report)
    }
}

fn already_in_wishlist() -> AppError {
    AppError::conflict("ALREADY_IN_WISHLIST", "product is already on the wishlist")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use emporium_core::WishlistItemId;

    use super::*;
    use crate::models::product::tests::dec;

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
    fn test_price_sweep_notifies_drops_only() {
        let item = snapshot("50.00", "40.00", true, 3);
        let change = item.detect_change();
        let n = sweep_notification(Sweep::Price, &item, &change).unwrap();
        assert_eq!(n.kind, NotificationKind::PriceDrop);
        assert_eq!(n.reference_id, Some(item.product_id.as_uuid()));
        assert!(sweep_notification(Sweep::Stock, &item, &change).is_none());

        let rise = snapshot("40.00", "50.00", true, 3);
        let change = rise.detect_change();
        assert!(sweep_touches(Sweep::Price, &change));
        assert!(sweep_notification(Sweep::Price, &rise, &change).is_none());
    }

    #[test]
    fn test_stock_sweep_notifies_restocks_only() {
        let item = snapshot("10.00", "10.00", false, 4);
        let change = item.detect_change();
        let n = sweep_notification(Sweep::Stock, &item, &change).unwrap();
        assert_eq!(n.kind, NotificationKind::BackInStock);
        assert!(!sweep_touches(Sweep::Price, &change));

        let sold_out = snapshot("10.00", "10.00", true, 0);
        let change = sold_out.detect_change();
        assert!(sweep_touches(Sweep::Stock, &change));
        assert!(sweep_notification(Sweep::Stock, &sold_out, &change).is_none());
    }

    #[test]
    fn test_add_request_defaults_flags() {
        let request: AddToWishlist = serde_json::from_value(serde_json::json!({
            "product_id": ProductId::generate(),
        }))
        .unwrap();
        assert!(request.notify_on_price_drop);
        assert!(request.notify_on_back_in_stock);
    }

    #[test]
    fn test_already_in_wishlist_code() {
        let err = already_in_wishlist();
        assert_eq!(err.code(), "ALREADY_IN_WISHLIST");
        assert_eq!(err.status(), axum::http::StatusCode::CONFLICT);
    }
}
