//! Coupon administration and validation.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};

use emporium_core::{CouponId, Page, PageRequest};

use crate::error::Result;
use crate::middleware::{RequireAdmin, RequireUser};
use crate::models::Coupon;
use crate::services::coupon::{CouponInput, CouponService, CouponValidation, ValidateCoupon};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/validate", post(validate))
        .route("/{id}", get(show).put(update).delete(remove))
}

async fn list(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<Coupon>>> {
    Ok(Json(CouponService::new(&state).list(page).await?))
}

async fn create(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<CouponInput>,
) -> Result<(StatusCode, Json<Coupon>)> {
    let coupon = CouponService::new(&state).create(input).await?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

async fn show(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<CouponId>,
) -> Result<Json<Coupon>> {
    Ok(Json(CouponService::new(&state).get(id).await?))
}

async fn update(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<CouponId>,
    Json(input): Json<CouponInput>,
) -> Result<Json<Coupon>> {
    Ok(Json(CouponService::new(&state).update(id, input).await?))
}

async fn remove(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<CouponId>,
) -> Result<StatusCode> {
    CouponService::new(&state).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Rejections come back as `200` with `valid: false`.
async fn validate(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Json(body): Json<ValidateCoupon>,
) -> Result<Json<CouponValidation>> {
    Ok(Json(CouponService::new(&state).validate(user.id, &body).await?))
}
