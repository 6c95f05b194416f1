//! Outgoing email log.

use chrono::{DateTime, Utc};
use serde::Serialize;

use emporium_core::{EmailLogId, EmailStatus};

/// Attempts after which a failed email is left alone.
pub const MAX_EMAIL_RETRIES: i32 = 3;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EmailLog {
    pub id: EmailLogId,
    pub recipient: String,
    pub subject: String,
    #[serde(skip)]
    pub body_html: String,
    #[serde(skip)]
    pub body_text: String,
    pub status: EmailStatus,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl EmailLog {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.status == EmailStatus::Failed && self.retry_count < MAX_EMAIL_RETRIES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(status: EmailStatus, retry_count: i32) -> EmailLog {
        EmailLog {
            id: EmailLogId::generate(),
            recipient: "ada@example.com".to_string(),
            subject: "Order confirmed".to_string(),
            body_html: String::new(),
            body_text: String::new(),
            status,
            retry_count,
            last_error: None,
            sent_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_retry_limit() {
        assert!(log(EmailStatus::Failed, 1).is_retryable());
        assert!(log(EmailStatus::Failed, 2).is_retryable());
        assert!(!log(EmailStatus::Failed, 3).is_retryable());
        assert!(!log(EmailStatus::Sent, 0).is_retryable());
    }
}
