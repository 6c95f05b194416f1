//! In-app notifications.

use emporium_core::{NotificationId, NotificationKind, PageRequest, UserId};

use super::{PgExecutor, RepositoryError};
use crate::models::{NewNotification, Notification};

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, kind, title, message, reference_id, is_read, read_at, created_at";

/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn create(
    db: impl PgExecutor<'_>,
    new: &NewNotification,
) -> Result<Notification, RepositoryError> {
    let row = sqlx::query_as::<_, Notification>(&format!(
        "INSERT INTO notifications (id, user_id, kind, title, message, reference_id) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING {NOTIFICATION_COLUMNS}"
    ))
    .bind(NotificationId::generate())
    .bind(new.user_id)
    .bind(new.kind)
    .bind(&new.title)
    .bind(&new.message)
    .bind(new.reference_id)
    .fetch_one(db)
    .await?;
    Ok(row)
}

/// One `general` notification per listed user, in a single statement.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn create_for_users(
    db: impl PgExecutor<'_>,
    user_ids: &[UserId],
    kind: NotificationKind,
    title: &str,
    message: &str,
) -> Result<u64, RepositoryError> {
    let result = sqlx::query(
        "INSERT INTO notifications (id, user_id, kind, title, message) \
         SELECT gen_random_uuid(), u.user_id, $2, $3, $4 FROM UNNEST($1::uuid[]) AS u(user_id)",
    )
    .bind(user_ids)
    .bind(kind)
    .bind(title)
    .bind(message)
    .execute(db)
    .await?;
    Ok(result.rows_affected())
}

/// A user's notifications, newest first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list<'c, E>(
    db: E,
    user_id: UserId,
    unread_only: bool,
    page: PageRequest,
) -> Result<(Vec<Notification>, i64), RepositoryError>
where
    E: PgExecutor<'c> + Copy,
{
    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND (NOT $2 OR NOT is_read)",
    )
    .bind(user_id)
    .bind(unread_only)
    .fetch_one(db)
    .await?;
    let rows = sqlx::query_as::<_, Notification>(&format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
         WHERE user_id = $1 AND (NOT $2 OR NOT is_read) \
         ORDER BY created_at DESC, id LIMIT $3 OFFSET $4"
    ))
    .bind(user_id)
    .bind(unread_only)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(db)
    .await?;
    Ok((rows, total))
}

/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn unread_count(db: impl PgExecutor<'_>, user_id: UserId) -> Result<i64, RepositoryError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT is_read",
    )
    .bind(user_id)
    .fetch_one(db)
    .await?;
    Ok(count)
}

/// Mark one notification read. Already-read notifications keep their `read_at`.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if it does not belong to the user.
pub async fn mark_read(
    db: impl PgExecutor<'_>,
    id: NotificationId,
    user_id: UserId,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "UPDATE notifications SET is_read = TRUE, read_at = COALESCE(read_at, NOW()) \
         WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user_id)
    .execute(db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn mark_all_read(db: impl PgExecutor<'_>, user_id: UserId) -> Result<u64, RepositoryError> {
    let result = sqlx::query(
        "UPDATE notifications SET is_read = TRUE, read_at = NOW() WHERE user_id = $1 AND NOT is_read",
    )
    .bind(user_id)
    .execute(db)
    .await?;
    Ok(result.rows_affected())
}

/// # Errors
///
/// Returns `RepositoryError::NotFound` if it does not belong to the user.
pub async fn delete(
    db: impl PgExecutor<'_>,
    id: NotificationId,
    user_id: UserId,
) -> Result<(), RepositoryError> {
    let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}
