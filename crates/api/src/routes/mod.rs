//! HTTP route handlers for the JSON API.
//!
//! # Route Structure
//!
//! ```text
//! # Auth (strict rate limit on register/login)
//! POST /api/auth/register             - Create a customer account
//! POST /api/auth/login                - Exchange credentials for a token
//! GET  /api/auth/me                   - Current user
//!
//! # Catalog
//! GET  /api/categories[/tree|/{id}]   - Categories (admin: POST, PUT, DELETE)
//! GET  /api/products[/{id}|/slug/{s}] - Products (admin: POST, PUT, DELETE)
//! GET  /api/products/{id}/reviews     - Approved reviews + rating breakdown
//! POST /api/products/{id}/reviews     - Submit a review
//! GET  /api/search[/suggest]          - Filtered search, name suggestions
//!
//! # Shopping
//! /api/cart, /api/cart/items[/{id}], /api/cart/coupon
//! /api/wishlist, /api/wishlist/items/{product_id}[/move-to-cart]
//! /api/orders[/{id}[/cancel|/payments|/cargo]]
//! /api/payments[/{id}]
//! POST /api/coupons/validate
//! GET  /api/cargo/track/{tracking_number}
//!
//! # Reviews, notifications
//! PUT/DELETE /api/reviews/{id}, POST /api/reviews/{id}/helpful
//! /api/notifications[/unread-count|/read-all|/{id}[/read]]
//!
//! # Admin (admin role)
//! /api/coupons[/{id}]
//! /api/admin/orders[/{id}[/status]]
//! /api/admin/payments/{id}/refund
//! /api/admin/wishlists/check-prices, /api/admin/wishlists/check-stock
//! /api/admin/reviews/pending, /api/admin/reviews/{id}/approve
//! /api/admin/inventory/low-stock, /api/admin/inventory/{product_id}/{adjust|history}
//! /api/admin/notifications/broadcast
//! /api/admin/emails/retry
//! /api/admin/cargo, /api/admin/cargo/{id}/events
//! ```

pub mod auth;
pub mod cargo;
pub mod cart;
pub mod categories;
pub mod coupons;
pub mod emails;
pub mod inventory;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod products;
pub mod reviews;
pub mod search;
pub mod wishlist;

use axum::Router;

use crate::middleware::{api_rate_limiter, auth_rate_limiter};
use crate::state::AppState;

/// Admin-only routers, mounted under `/api/admin`.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .nest("/orders", orders::admin_router())
        .nest("/payments", payments::admin_router())
        .nest("/wishlists", wishlist::admin_router())
        .nest("/reviews", reviews::admin_router())
        .nest("/inventory", inventory::admin_router())
        .nest("/notifications", notifications::admin_router())
        .nest("/emails", emails::admin_router())
        .nest("/cargo", cargo::admin_router())
}

/// Everything under `/api` except register and login.
fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::session_router())
        .nest("/categories", categories::router())
        .nest("/products", products::router())
        .nest("/search", search::router())
        .nest("/cart", cart::router())
        .nest("/orders", orders::router())
        .nest("/payments", payments::router())
        .nest("/coupons", coupons::router())
        .nest("/wishlist", wishlist::router())
        .nest("/reviews", reviews::router())
        .nest("/notifications", notifications::router())
        .nest("/cargo", cargo::router())
        .nest("/admin", admin_routes())
}

/// All `/api` routes with their rate limits.
pub fn routes() -> Router<AppState> {
    let credentials = Router::new()
        .nest("/api/auth", auth::router())
        .layer(auth_rate_limiter());

    Router::new()
        .nest("/api", api_routes())
        .layer(api_rate_limiter())
        .merge(credentials)
}
