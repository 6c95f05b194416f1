//! Unified error handling with Sentry integration.
//!
//! Every handler returns `Result<T, AppError>`. Errors render as a JSON problem
//! body `{ "status", "code", "message" }`; server errors are captured to Sentry
//! before responding and never expose internal details.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::models::CouponRejection;
use crate::services::auth::AuthError;
use crate::services::payment::GatewayError;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Coupon failed validation.
    #[error("Coupon rejected: {0}")]
    Coupon(#[from] CouponRejection),

    /// Payment gateway could not be reached or answered nonsense.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Request input failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A business rule rejected the request.
    #[error("{code}: {message}")]
    Rule { code: &'static str, message: String },

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User is authenticated but lacks permission.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Request conflicts with current state.
    #[error("{code}: {message}")]
    Conflict { code: &'static str, message: String },

    /// The gateway declined the charge.
    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn rule(code: &'static str, message: impl Into<String>) -> Self {
        Self::Rule {
            code,
            message: message.into(),
        }
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        Self::Conflict {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    const fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Database(RepositoryError::Database(_) | RepositoryError::DataCorruption(_))
                | Self::Internal(_)
                | Self::Gateway(_)
                | Self::Auth(AuthError::PasswordHash | AuthError::Repository(_))
        )
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Database(err) => match err {
                RepositoryError::NotFound => StatusCode::NOT_FOUND,
                RepositoryError::Conflict(_) => StatusCode::CONFLICT,
                RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials
                | AuthError::AccountDisabled
                | AuthError::Token(_)
                | AuthError::MissingToken => StatusCode::UNAUTHORIZED,
                AuthError::UserAlreadyExists => StatusCode::CONFLICT,
                AuthError::WeakPassword(_) | AuthError::InvalidEmail(_) | AuthError::InvalidName => {
                    StatusCode::BAD_REQUEST
                }
                AuthError::PasswordHash | AuthError::Repository(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Coupon(CouponRejection::NotFound) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Coupon(_) | Self::Validation(_) | Self::Rule { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
            Self::Gateway(_) => StatusCode::BAD_GATEWAY,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Database(err) => match err {
                RepositoryError::NotFound => "NOT_FOUND",
                RepositoryError::Conflict(_) => "CONFLICT",
                RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
                    "INTERNAL_ERROR"
                }
            },
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
                AuthError::AccountDisabled => "ACCOUNT_DISABLED",
                AuthError::Token(_) => "INVALID_TOKEN",
                AuthError::MissingToken => "UNAUTHORIZED",
                AuthError::UserAlreadyExists => "EMAIL_ALREADY_REGISTERED",
                AuthError::WeakPassword(_) | AuthError::InvalidEmail(_) | AuthError::InvalidName => {
                    "VALIDATION_ERROR"
                }
                AuthError::PasswordHash | AuthError::Repository(_) => "INTERNAL_ERROR",
            },
            Self::Coupon(rejection) => rejection.code(),
            Self::Gateway(_) => "PAYMENT_GATEWAY_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Rule { code, .. } | Self::Conflict { code, .. } => *code,
            Self::NotFound(_) => "NOT_FOUND",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::PaymentDeclined(_) => "PAYMENT_DECLINED",
            Self::RateLimited => "RATE_LIMITED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Client-facing message.
    fn public_message(&self) -> String {
        match self {
            Self::Database(RepositoryError::NotFound) => "Resource not found".to_string(),
            Self::Database(RepositoryError::Conflict(msg)) => msg.clone(),
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::Gateway(_) => "Payment service unavailable".to_string(),
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => "Invalid email or password".to_string(),
                AuthError::AccountDisabled => "This account has been disabled".to_string(),
                AuthError::Token(_) => "Invalid or expired token".to_string(),
                AuthError::MissingToken => "Authentication required".to_string(),
                AuthError::UserAlreadyExists => {
                    "An account with this email already exists".to_string()
                }
                AuthError::WeakPassword(msg) => msg.clone(),
                AuthError::InvalidEmail(_) => "Invalid email address".to_string(),
                AuthError::InvalidName => "First and last name are required".to_string(),
                AuthError::PasswordHash | AuthError::Repository(_) => {
                    "Internal server error".to_string()
                }
            },
            Self::Coupon(rejection) => rejection.to_string(),
            Self::Validation(msg)
            | Self::NotFound(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::PaymentDeclined(msg)
            | Self::Rule { message: msg, .. }
            | Self::Conflict { message: msg, .. } => msg.clone(),
            Self::RateLimited => "Too many requests".to_string(),
        }
    }
}

/// JSON problem body.
#[derive(Debug, Serialize)]
pub struct ProblemBody {
    pub status: u16,
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = self.status();
        let body = ProblemBody {
            status: status.as_u16(),
            code: self.code(),
            message: self.public_message(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context for the current request.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Add a breadcrumb for a user action.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("order", "Placed order", Some(&[("order_number", "ORD-20260301-ABC123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("product".to_string());
        assert_eq!(err.to_string(), "Not found: product");

        let err = AppError::rule("INSUFFICIENT_STOCK", "only 2 left");
        assert_eq!(err.to_string(), "INSUFFICIENT_STOCK: only 2 left");
    }

    #[test]
    fn test_app_error_status_codes() {
        fn get_status(err: AppError) -> StatusCode {
            err.into_response().status()
        }

        assert_eq!(get_status(AppError::not_found("x")), StatusCode::NOT_FOUND);
        assert_eq!(
            get_status(AppError::Unauthorized("x".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Forbidden("x".to_string())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(get_status(AppError::validation("x")), StatusCode::BAD_REQUEST);
        assert_eq!(
            get_status(AppError::conflict("ALREADY_IN_WISHLIST", "x")),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(AppError::PaymentDeclined("x".to_string())),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(get_status(AppError::RateLimited), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            get_status(AppError::Internal("x".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(AppError::Database(RepositoryError::NotFound)),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_problem_body_carries_code() {
        let (status, body) = body_json(AppError::Coupon(CouponRejection::Expired)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], 400);
        assert_eq!(body["code"], "COUPON_EXPIRED");
        assert_eq!(body["message"], "coupon has expired");
    }

    #[tokio::test]
    async fn test_internal_details_hidden() {
        let (status, body) = body_json(AppError::Internal("db password leaked".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "INTERNAL_ERROR");
        assert_eq!(body["message"], "Internal server error");
    }

    #[tokio::test]
    async fn test_repository_conflict_message_passes_through() {
        let err = AppError::Database(RepositoryError::Conflict("slug taken".to_string()));
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "slug taken");
    }
}
