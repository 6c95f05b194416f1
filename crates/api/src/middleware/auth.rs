//! Bearer token extractors.
//!
//! Handlers that need a caller take one of these as an argument:
//!
//! ```rust,ignore
//! async fn my_orders(RequireUser(user): RequireUser) -> impl IntoResponse {
//!     format!("Hello, {}!", user.email)
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::Utc;

use emporium_core::{UserId, UserRole};

use crate::error::{AppError, set_sentry_user};
use crate::services::auth::{AuthError, Claims};
use crate::state::AppState;

/// The authenticated caller, taken from verified token claims.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: UserId,
    pub email: String,
    pub role: UserRole,
}

impl AuthUser {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Ownership filter for lookups: `None` lets admins see everything.
    #[must_use]
    pub fn owner_scope(&self) -> Option<UserId> {
        (!self.is_admin()).then_some(self.id)
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            email: claims.email,
            role: claims.role,
        }
    }
}

/// The token from an `Authorization: Bearer <token>` header.
fn bearer_token(parts: &Parts) -> Result<Option<&str>, AuthError> {
    let Some(value) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| AuthError::MissingToken)?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)?;
    Ok(Some(token))
}

fn authenticate(parts: &Parts, state: &AppState) -> Result<Option<AuthUser>, AppError> {
    let Some(token) = bearer_token(parts)? else {
        return Ok(None);
    };
    let claims = state
        .tokens()
        .verify(token, Utc::now())
        .map_err(AuthError::from)?;
    let user = AuthUser::from(claims);
    set_sentry_user(&user.id, Some(&user.email));
    tracing::Span::current().record("user_id", tracing::field::display(user.id));
    Ok(Some(user))
}

/// Extractor that requires a valid bearer token.
pub struct RequireUser(pub AuthUser);

impl FromRequestParts<AppState> for RequireUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        authenticate(parts, state)?
            .map(Self)
            .ok_or(AppError::Auth(AuthError::MissingToken))
    }
}

/// Extractor that requires a valid bearer token with the admin role.
pub struct RequireAdmin(pub AuthUser);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let RequireUser(user) = RequireUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AppError::Forbidden("admin access required".to_string()));
        }
        Ok(Self(user))
    }
}

/// Extractor that accepts anonymous callers.
///
/// A present but invalid token is still rejected.
pub struct OptionalUser(pub Option<AuthUser>);

impl FromRequestParts<AppState> for OptionalUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Self(authenticate(parts, state)?))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/orders");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&parts(None)).unwrap(), None);
        assert_eq!(bearer_token(&parts(Some("Bearer abc.def.ghi"))).unwrap(), Some("abc.def.ghi"));
        assert!(bearer_token(&parts(Some("Basic dXNlcjpwYXNz"))).is_err());
        assert!(bearer_token(&parts(Some("Bearer   "))).is_err());
    }

    #[test]
    fn test_owner_scope() {
        let customer = AuthUser {
            id: UserId::generate(),
            email: "ada@example.com".to_string(),
            role: UserRole::Customer,
        };
        assert_eq!(customer.owner_scope(), Some(customer.id));

        let admin = AuthUser {
            role: UserRole::Admin,
            ..customer
        };
        assert_eq!(admin.owner_scope(), None);
    }
}
