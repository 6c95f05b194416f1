//! Database operations for the commerce `PostgreSQL` schema.
//!
//! ## Tables
//!
//! - `users` - Accounts and roles
//! - `categories`, `products` - Catalog (soft-deleted via `is_deleted`)
//! - `inventory_movements` - Stock change ledger
//! - `carts`, `cart_items` - One cart per user
//! - `orders`, `order_items` - Placed orders with item snapshots
//! - `coupons`, `coupon_usages` - Discount codes and redemptions
//! - `payments` - Charges and refunds per order
//! - `wishlists`, `wishlist_items` - Saved products with price/stock snapshots
//! - `product_reviews` - Ratings and moderation state
//! - `notifications`, `email_logs` - In-app notifications and outgoing mail
//! - `cargos`, `cargo_tracking_events` - Shipments
//!
//! Repository functions take any [`PgExecutor`] so they can run against the
//! pool or inside a [`UnitOfWork`].
//!
//! # Migrations
//!
//! Migrations are stored in `crates/api/migrations/` and run via:
//! ```bash
//! cargo run -p emporium-cli -- migrate
//! ```

pub mod cargo;
pub mod carts;
pub mod categories;
pub mod coupons;
pub mod emails;
pub mod inventory;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod products;
pub mod reviews;
pub mod users;
pub mod wishlists;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use thiserror::Error;

pub use sqlx::PgExecutor;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique slug).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Map a unique-constraint violation to `RepositoryError::Conflict`.
pub(crate) fn conflict_on_unique(message: &str) -> impl FnOnce(sqlx::Error) -> RepositoryError + '_ {
    move |e| {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return RepositoryError::Conflict(message.to_owned());
        }
        RepositoryError::Database(e)
    }
}

/// A transaction-scoped batch of repository calls, committed once.
///
/// Dropping a `UnitOfWork` without calling [`UnitOfWork::commit`] rolls the
/// transaction back.
pub struct UnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl UnitOfWork {
    /// Begin a new transaction on the pool.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if no connection can be acquired.
    pub async fn begin(pool: &PgPool) -> Result<Self, RepositoryError> {
        Ok(Self {
            tx: pool.begin().await?,
        })
    }

    /// Connection to pass to repository functions.
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    /// Commit every change made through this unit of work.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the commit fails.
    pub async fn commit(self) -> Result<(), RepositoryError> {
        self.tx.commit().await?;
        Ok(())
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Round-trip a trivial query to prove the database is reachable.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn ping(db: impl PgExecutor<'_>) -> Result<(), RepositoryError> {
    sqlx::query("SELECT 1").execute(db).await?;
    Ok(())
}
