//! User domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use emporium_core::{Email, UserId, UserRole};

/// An account row.
///
/// Implements `Debug` manually to redact the password hash.
#[derive(Clone, sqlx::FromRow)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Normalized (lower-case) email address.
    pub email: Email,
    /// Argon2id PHC string.
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    /// Inactive users cannot log in.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// "First Last".
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password_hash", &"[REDACTED]")
            .field("role", &self.role)
            .field("is_active", &self.is_active)
            .finish_non_exhaustive()
    }
}

/// Public view of a user.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: UserId,
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role,
            created_at: user.created_at,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: UserId::generate(),
            email: Email::parse("ada@example.com").unwrap(),
            password_hash: "$argon2id$v=19$m=19456,t=2,p=1$abc$def".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            role: UserRole::Customer,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_debug_redacts_password_hash() {
        let output = format!("{:?}", user());
        assert!(output.contains("[REDACTED]"));
        assert!(!output.contains("argon2id"));
    }

    #[test]
    fn test_profile_omits_hash() {
        let json = serde_json::to_string(&UserProfile::from(&user())).unwrap();
        assert!(json.contains("ada@example.com"));
        assert!(!json.contains("password"));
    }

    #[test]
    fn test_full_name_and_role() {
        let mut u = user();
        assert_eq!(u.full_name(), "Ada Lovelace");
        assert!(!u.is_admin());
        u.role = UserRole::Admin;
        assert!(u.is_admin());
    }
}
