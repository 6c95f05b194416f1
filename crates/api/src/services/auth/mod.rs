//! Authentication service.
//!
//! Password registration and login backed by Argon2id hashes, plus the
//! HS256 bearer tokens handed out on success.

mod error;
pub mod token;

pub use error::AuthError;
pub use token::{Claims, IssuedToken, TokenError, TokenSigner};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sqlx::PgPool;
use tracing::instrument;

use emporium_core::{Email, UserId, UserRole};

use crate::db::RepositoryError;
use crate::db::users::{self, NewUser};
use crate::models::User;

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Registration input.
#[derive(Debug)]
pub struct Registration<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
}

/// Authentication service.
pub struct AuthService<'a> {
    pool: &'a PgPool,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Register a new customer account.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::InvalidName` if either name is blank.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(&self, input: &Registration<'_>) -> Result<User, AuthError> {
        self.create_account(input, UserRole::Customer).await
    }

    /// Create an account with an explicit role.
    ///
    /// # Errors
    ///
    /// Same as [`AuthService::register`].
    pub async fn create_account(
        &self,
        input: &Registration<'_>,
        role: UserRole,
    ) -> Result<User, AuthError> {
        let (email, first_name, last_name) = validate_registration(input)?;
        let password_hash = hash_password(input.password)?;

        let user = users::create(
            self.pool,
            &NewUser {
                email: &email,
                password_hash: &password_hash,
                first_name,
                last_name,
                role,
            },
        )
        .await
        .map_err(|e| match e {
            RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
            other => AuthError::Repository(other),
        })?;

        tracing::info!(user_id = %user.id, role = %user.role, "Account created");
        Ok(user)
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    /// Returns `AuthError::AccountDisabled` if the account is inactive.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        // A malformed email cannot belong to anyone.
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let user = users::get_by_email(self.pool, &email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &user.password_hash)?;

        if !user.is_active {
            tracing::warn!(user_id = %user.id, "Login attempt on disabled account");
            return Err(AuthError::AccountDisabled);
        }

        Ok(user)
    }

    /// Load the account behind a verified token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the user no longer exists.
    /// Returns `AuthError::AccountDisabled` if the account is inactive.
    pub async fn get_user(&self, id: UserId) -> Result<User, AuthError> {
        let user = users::get_by_id(self.pool, id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }
        Ok(user)
    }
}

/// Validate registration input without touching the database.
///
/// # Errors
///
/// Returns the first failing rule as an [`AuthError`].
pub fn validate_registration<'r>(
    input: &Registration<'r>,
) -> Result<(Email, &'r str, &'r str), AuthError> {
    let email = Email::parse(input.email)?;
    validate_password(input.password)?;

    let first_name = input.first_name.trim();
    let last_name = input.last_name.trim();
    if first_name.is_empty() || last_name.is_empty() {
        return Err(AuthError::InvalidName);
    }

    Ok((email, first_name, last_name))
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if password.trim().is_empty() {
        return Err(AuthError::WeakPassword(
            "password must not be only whitespace".to_string(),
        ));
    }
    Ok(())
}

/// Hash a password with Argon2id.
///
/// # Errors
///
/// Returns `AuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn registration<'a>(email: &'a str, password: &'a str) -> Registration<'a> {
        Registration {
            email,
            password,
            first_name: "Ada",
            last_name: "Lovelace",
        }
    }

    #[test]
    fn test_validate_password_length() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("1234567").is_err());
        assert!(validate_password("12345678").is_ok());
        assert!(validate_password("        ").is_err());
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).is_ok());
        assert!(matches!(
            verify_password("battery staple", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(matches!(
            verify_password("anything", "not-a-phc-string"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_validate_registration() {
        let (email, first, last) =
            validate_registration(&registration("Ada@Example.com", "analytical")).unwrap();
        assert_eq!(email.as_str(), "ada@example.com");
        assert_eq!((first, last), ("Ada", "Lovelace"));

        assert!(matches!(
            validate_registration(&registration("not-an-email", "analytical")),
            Err(AuthError::InvalidEmail(_))
        ));
        assert!(matches!(
            validate_registration(&registration("ada@example.com", "short")),
            Err(AuthError::WeakPassword(_))
        ));

        let blank_name = Registration {
            first_name: "  ",
            ..registration("ada@example.com", "analytical")
        };
        assert!(matches!(
            validate_registration(&blank_name),
            Err(AuthError::InvalidName)
        ));
    }
}
