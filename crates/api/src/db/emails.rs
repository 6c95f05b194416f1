//! Outgoing email log.

use emporium_core::{EmailLogId, EmailStatus};

use super::{PgExecutor, RepositoryError};
use crate::models::EmailLog;
use crate::models::email::MAX_EMAIL_RETRIES;

const EMAIL_COLUMNS: &str = "id, recipient, subject, body_html, body_text, status, retry_count, \
     last_error, sent_at, created_at";

/// Log a rendered email as pending before it is sent.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn create_pending(
    db: impl PgExecutor<'_>,
    recipient: &str,
    subject: &str,
    body_html: &str,
    body_text: &str,
) -> Result<EmailLog, RepositoryError> {
    let row = sqlx::query_as::<_, EmailLog>(&format!(
        "INSERT INTO email_logs (id, recipient, subject, body_html, body_text) \
         VALUES ($1, $2, $3, $4, $5) RETURNING {EMAIL_COLUMNS}"
    ))
    .bind(EmailLogId::generate())
    .bind(recipient)
    .bind(subject)
    .bind(body_html)
    .bind(body_text)
    .fetch_one(db)
    .await?;
    Ok(row)
}

/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn mark_sent(db: impl PgExecutor<'_>, id: EmailLogId) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE email_logs SET status = $2, sent_at = NOW(), last_error = NULL, updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(EmailStatus::Sent)
    .execute(db)
    .await?;
    Ok(())
}

/// Record a failed attempt, incrementing `retry_count`.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn mark_failed(
    db: impl PgExecutor<'_>,
    id: EmailLogId,
    error: &str,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE email_logs SET status = $2, retry_count = retry_count + 1, last_error = $3, \
             updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(EmailStatus::Failed)
    .bind(error)
    .execute(db)
    .await?;
    Ok(())
}

/// Failed emails that still have attempts left, oldest first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn retryable(db: impl PgExecutor<'_>, limit: i64) -> Result<Vec<EmailLog>, RepositoryError> {
    let rows = sqlx::query_as::<_, EmailLog>(&format!(
        "SELECT {EMAIL_COLUMNS} FROM email_logs WHERE status = $1 AND retry_count < $2 \
         ORDER BY created_at, id LIMIT $3"
    ))
    .bind(EmailStatus::Failed)
    .bind(MAX_EMAIL_RETRIES)
    .bind(limit)
    .fetch_all(db)
    .await?;
    Ok(rows)
}
