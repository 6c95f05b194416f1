//! User accounts.

use emporium_core::{Email, UserId, UserRole};

use super::{PgExecutor, RepositoryError, conflict_on_unique};
use crate::models::User;

const USER_COLUMNS: &str =
    "id, email, password_hash, first_name, last_name, role, is_active, created_at, updated_at";

/// Fields for a new account.
#[derive(Debug)]
pub struct NewUser<'a> {
    pub email: &'a Email,
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub role: UserRole,
}

/// Get a user by email.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get_by_email(
    db: impl PgExecutor<'_>,
    email: &Email,
) -> Result<Option<User>, RepositoryError> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND NOT is_deleted"
    ))
    .bind(email)
    .fetch_optional(db)
    .await?;
    Ok(user)
}

/// Get a user by ID.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get_by_id(db: impl PgExecutor<'_>, id: UserId) -> Result<Option<User>, RepositoryError> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND NOT is_deleted"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(user)
}

/// Insert a user.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the email already exists.
pub async fn create(db: impl PgExecutor<'_>, new: &NewUser<'_>) -> Result<User, RepositoryError> {
    sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (id, email, password_hash, first_name, last_name, role) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(UserId::generate())
    .bind(new.email)
    .bind(new.password_hash)
    .bind(new.first_name)
    .bind(new.last_name)
    .bind(new.role)
    .fetch_one(db)
    .await
    .map_err(conflict_on_unique("email already exists"))
}

/// Change a user's role.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if no such user exists.
pub async fn set_role(
    db: impl PgExecutor<'_>,
    id: UserId,
    role: UserRole,
) -> Result<(), RepositoryError> {
    let result = sqlx::query("UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1 AND NOT is_deleted")
        .bind(id)
        .bind(role)
        .execute(db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

/// IDs of every active user, for broadcasts.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list_active_ids(db: impl PgExecutor<'_>) -> Result<Vec<UserId>, RepositoryError> {
    let ids = sqlx::query_scalar::<_, UserId>(
        "SELECT id FROM users WHERE is_active AND NOT is_deleted ORDER BY created_at",
    )
    .fetch_all(db)
    .await?;
    Ok(ids)
}
