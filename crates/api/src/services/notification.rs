//! In-app notifications.

use serde::Serialize;
use sqlx::PgPool;

use emporium_core::{NotificationId, NotificationKind, Page, PageRequest, UserId};

use crate::db::{PgExecutor, notifications, users};
use crate::error::{AppError, Result};
use crate::models::{NewNotification, Notification};

/// Title and message length limits for broadcasts.
const MAX_TITLE_CHARS: usize = 200;
const MAX_MESSAGE_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct UnreadCount {
    pub unread: i64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct BroadcastReport {
    pub recipients: u64,
}

/// Store a notification. Used by orders, payments, cargo and wishlists.
///
/// # Errors
///
/// Returns `AppError::Database` if the insert fails.
pub async fn notify(db: impl PgExecutor<'_>, new: &NewNotification) -> Result<Notification> {
    let notification = notifications::create(db, new).await?;
    tracing::debug!(
        user_id = %notification.user_id,
        kind = %notification.kind,
        "Notification stored"
    );
    Ok(notification)
}

/// Store a notification, logging instead of failing.
pub async fn notify_quietly(db: impl PgExecutor<'_>, new: &NewNotification) {
    if let Err(e) = notify(db, new).await {
        tracing::warn!(user_id = %new.user_id, kind = %new.kind, error = %e, "Failed to store notification");
    }
}

pub struct NotificationService<'a> {
    pool: &'a PgPool,
}

impl<'a> NotificationService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if the query fails.
    pub async fn list(
        &self,
        user_id: UserId,
        unread_only: bool,
        page: PageRequest,
    ) -> Result<Page<Notification>> {
        let (items, total) = notifications::list(self.pool, user_id, unread_only, page).await?;
        Ok(Page::new(items, page, total))
    }

    /// # Errors
    ///
    /// Returns `AppError::Database` if the query fails.
    pub async fn unread_count(&self, user_id: UserId) -> Result<UnreadCount> {
        let unread = notifications::unread_count(self.pool, user_id).await?;
        Ok(UnreadCount { unread })
    }

    /// # Errors
    ///
    /// Returns `AppError::Database` (not found) unless the notification
    /// belongs to the user.
    pub async fn mark_read(&self, user_id: UserId, id: NotificationId) -> Result<()> {
        notifications::mark_read(self.pool, id, user_id).await?;
        Ok(())
    }

    /// Returns the number of notifications marked read.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if the update fails.
    pub async fn mark_all_read(&self, user_id: UserId) -> Result<u64> {
        Ok(notifications::mark_all_read(self.pool, user_id).await?)
    }

    /// # Errors
    ///
    /// Returns `AppError::Database` (not found) unless the notification
    /// belongs to the user.
    pub async fn delete(&self, user_id: UserId, id: NotificationId) -> Result<()> {
        notifications::delete(self.pool, id, user_id).await?;
        Ok(())
    }

    /// Send a `general` notification to every active user.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for a blank or oversized title/message.
    pub async fn broadcast(&self, title: &str, message: &str) -> Result<BroadcastReport> {
        let (title, message) = validate_broadcast(title, message)?;
        let recipients = users::list_active_ids(self.pool).await?;
        let inserted = notifications::create_for_users(
            self.pool,
            &recipients,
            NotificationKind::General,
            title,
            message,
        )
        .await?;
        tracing::info!(recipients = inserted, "Broadcast sent");
        Ok(BroadcastReport {
            recipients: inserted,
        })
    }
}

fn validate_broadcast<'m>(title: &'m str, message: &'m str) -> Result<(&'m str, &'m str)> {
    let title = title.trim();
    let message = message.trim();
    if title.is_empty() || message.is_empty() {
        return Err(AppError::validation("title and message are required"));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(AppError::validation(format!(
            "title must be at most {MAX_TITLE_CHARS} characters"
        )));
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(AppError::validation(format!(
            "message must be at most {MAX_MESSAGE_CHARS} characters"
        )));
    }
    Ok((title, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_broadcast() {
        assert_eq!(
            validate_broadcast("  Sale ", " 20% off today ").ok(),
            Some(("Sale", "20% off today"))
        );
        assert!(validate_broadcast("", "body").is_err());
        assert!(validate_broadcast("title", "   ").is_err());
        assert!(validate_broadcast(&"t".repeat(201), "body").is_err());
        assert!(validate_broadcast("title", &"m".repeat(2001)).is_err());
    }
}
