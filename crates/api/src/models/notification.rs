//! In-app notifications.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use emporium_core::{NotificationId, NotificationKind, UserId};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub reference_id: Option<Uuid>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A notification to be inserted.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub reference_id: Option<Uuid>,
}

impl NewNotification {
    pub fn new(
        user_id: UserId,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            kind,
            title: title.into(),
            message: message.into(),
            reference_id: None,
        }
    }

    #[must_use]
    pub fn with_reference(mut self, reference_id: impl Into<Uuid>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }
}
