//! Admin account management commands.

use emporium_api::db::users;
use emporium_api::services::auth::{AuthError, AuthService, Registration};
use emporium_core::{Email, UserRole};
use thiserror::Error;

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Connect(#[from] super::ConnectError),

    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] emporium_core::EmailError),

    #[error("Account error: {0}")]
    Auth(#[from] AuthError),

    #[error("Database error: {0}")]
    Repository(#[from] emporium_api::db::RepositoryError),

    #[error("No account with email: {0}")]
    UnknownUser(String),
}

/// Create an account with the admin role.
///
/// # Errors
///
/// Returns an error for invalid input, a taken email, or database failure.
pub async fn create_user(
    email: &str,
    first_name: &str,
    last_name: &str,
    password: &str,
) -> Result<(), AdminError> {
    let pool = super::connect().await?;

    tracing::info!("Creating admin account: {}", email);
    let user = AuthService::new(&pool)
        .create_account(
            &Registration {
                email,
                password,
                first_name,
                last_name,
            },
            UserRole::Admin,
        )
        .await?;

    tracing::info!("Admin account created: ID {}, email {}", user.id, user.email);
    Ok(())
}

/// Promote an existing account to admin.
///
/// # Errors
///
/// Returns `AdminError::UnknownUser` when no account matches.
pub async fn promote(email: &str) -> Result<(), AdminError> {
    let email = Email::parse(email)?;
    let pool = super::connect().await?;

    let user = users::get_by_email(&pool, &email)
        .await?
        .ok_or_else(|| AdminError::UnknownUser(email.to_string()))?;
    if user.role == UserRole::Admin {
        tracing::info!("{} is already an admin", email);
        return Ok(());
    }

    users::set_role(&pool, user.id, UserRole::Admin).await?;
    tracing::info!("Promoted {} to admin", email);
    Ok(())
}
