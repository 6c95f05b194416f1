//! Registration, login and the current user.

use axum::{Json, Router, extract::State, http::StatusCode, routing::{get, post}};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::RequireUser;
use crate::models::{User, UserProfile};
use crate::services::auth::{AuthService, Registration};
use crate::state::AppState;

/// Mounted under `/api/auth` with the stricter rate limit.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// Mounted under `/api/auth` with the general rate limit.
pub fn session_router() -> Router<AppState> {
    Router::new().route("/me", get(me))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token plus the profile it was issued for.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserProfile,
}

fn session_for(state: &AppState, user: &User) -> Result<SessionResponse> {
    let issued = state
        .tokens()
        .issue(user, Utc::now())
        .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))?;
    Ok(SessionResponse {
        token: issued.token,
        expires_at: issued.expires_at,
        user: UserProfile::from(user),
    })
}

#[instrument(skip(state, body), fields(email = %body.email))]
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<SessionResponse>)> {
    let user = AuthService::new(state.pool())
        .register(&Registration {
            email: &body.email,
            password: &body.password,
            first_name: &body.first_name,
            last_name: &body.last_name,
        })
        .await?;
    add_breadcrumb("auth", "Registered", None);
    Ok((StatusCode::CREATED, Json(session_for(&state, &user)?)))
}

#[instrument(skip(state, body), fields(email = %body.email))]
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<SessionResponse>> {
    let user = AuthService::new(state.pool())
        .login(&body.email, &body.password)
        .await?;
    add_breadcrumb("auth", "Logged in", None);
    Ok(Json(session_for(&state, &user)?))
}

async fn me(State(state): State<AppState>, RequireUser(user): RequireUser) -> Result<Json<UserProfile>> {
    let user = AuthService::new(state.pool()).get_user(user.id).await?;
    Ok(Json(UserProfile::from(&user)))
}
