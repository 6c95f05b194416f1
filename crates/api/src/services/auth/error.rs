//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;

use super::token::TokenError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] emporium_core::EmailError),

    /// Invalid credentials (wrong password or unknown email).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Account exists but has been deactivated.
    #[error("account disabled")]
    AccountDisabled,

    /// User already exists.
    #[error("user already exists")]
    UserAlreadyExists,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// First or last name missing.
    #[error("first and last name are required")]
    InvalidName,

    /// Bearer token failed verification.
    #[error("token error: {0}")]
    Token(#[from] TokenError),

    /// No bearer token on a protected route.
    #[error("missing bearer token")]
    MissingToken,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
