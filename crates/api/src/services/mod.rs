//! Business logic services.
//!
//! Each service borrows [`AppState`](crate::state::AppState) for the length of
//! a request and runs a short sequence of repository calls, wrapping
//! multi-row writes in a [`UnitOfWork`](crate::db::UnitOfWork).
//!
//! # Services
//!
//! - `auth` - Registration, login and bearer tokens
//! - `cache` - In-memory JSON cache for catalog reads
//! - `category`, `product`, `search` - Catalog
//! - `cart`, `coupon`, `order`, `payment` - Checkout
//! - `wishlist`, `review` - Customer engagement
//! - `inventory`, `cargo` - Fulfilment
//! - `notification`, `email` - Outgoing messages

pub mod auth;
pub mod cache;
pub mod cargo;
pub mod cart;
pub mod category;
pub mod coupon;
pub mod email;
pub mod inventory;
pub mod notification;
pub mod order;
pub mod payment;
pub mod product;
pub mod review;
pub mod search;
pub mod wishlist;
