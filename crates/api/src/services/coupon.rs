//! Coupon administration and validation.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use emporium_core::{CategoryId, CouponId, DiscountType, Page, PageRequest, UserId};

use crate::db::coupons::{self, CouponFields};
use crate::db::PgExecutor;
use crate::error::{AppError, Result};
use crate::models::coupon::normalize_code;
use crate::models::order::ShippingRule;
use crate::models::{Coupon, CouponCheck, CouponLine, CouponRejection};
use crate::state::AppState;

/// Normalized coupon codes.
static COUPON_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9_-]{3,32}$").expect("Invalid regex"));

/// Whether a normalized code is well formed.
#[must_use]
pub fn is_valid_code(code: &str) -> bool {
    COUPON_CODE_RE.is_match(code)
}

/// Admin input for creating or replacing a coupon.
#[derive(Debug, Clone, Deserialize)]
pub struct CouponInput {
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    #[serde(default)]
    pub discount_value: Decimal,
    pub minimum_order_amount: Option<Decimal>,
    pub maximum_discount_amount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub usage_limit_per_user: Option<i32>,
    #[serde(default)]
    pub applicable_category_ids: Vec<CategoryId>,
    pub starts_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

const fn default_active() -> bool {
    true
}

impl CouponInput {
    /// Normalize the code and check every field rule.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for the first rule the input breaks.
    pub fn into_fields(self) -> Result<CouponFields> {
        let code = normalize_code(&self.code);
        if !is_valid_code(&code) {
            return Err(AppError::validation(
                "coupon code must be 3-32 characters of A-Z, 0-9, '_' or '-'",
            ));
        }

        match self.discount_type {
            DiscountType::Percentage => {
                if self.discount_value <= Decimal::ZERO || self.discount_value > Decimal::ONE_HUNDRED {
                    return Err(AppError::validation(
                        "percentage discount must be greater than 0 and at most 100",
                    ));
                }
            }
            DiscountType::FixedAmount => {
                if self.discount_value <= Decimal::ZERO {
                    return Err(AppError::validation(
                        "fixed discount must be greater than 0",
                    ));
                }
            }
            DiscountType::FreeShipping => {}
        }

        if self.expires_at <= self.starts_at {
            return Err(AppError::validation("expires_at must be after starts_at"));
        }
        for (name, amount) in [
            ("minimum_order_amount", self.minimum_order_amount),
            ("maximum_discount_amount", self.maximum_discount_amount),
        ] {
            if amount.is_some_and(|a| a < Decimal::ZERO) {
                return Err(AppError::validation(format!("{name} must not be negative")));
            }
        }
        for (name, limit) in [
            ("usage_limit", self.usage_limit),
            ("usage_limit_per_user", self.usage_limit_per_user),
        ] {
            if limit.is_some_and(|l| l < 1) {
                return Err(AppError::validation(format!("{name} must be at least 1")));
            }
        }

        let mut categories = self.applicable_category_ids;
        categories.sort_by_key(|c| c.as_uuid());
        categories.dedup();

        Ok(CouponFields {
            code,
            description: self.description.filter(|d| !d.trim().is_empty()),
            discount_type: self.discount_type,
            discount_value: if self.discount_type == DiscountType::FreeShipping {
                Decimal::ZERO
            } else {
                self.discount_value
            },
            minimum_order_amount: self.minimum_order_amount,
            maximum_discount_amount: self.maximum_discount_amount,
            usage_limit: self.usage_limit,
            usage_limit_per_user: self.usage_limit_per_user,
            applicable_category_ids: categories,
            starts_at: self.starts_at,
            expires_at: self.expires_at,
            is_active: self.is_active,
        })
    }
}

/// Body of `POST /api/coupons/validate`.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidateCoupon {
    pub code: String,
    pub order_amount: Decimal,
    #[serde(default)]
    pub category_ids: Vec<CategoryId>,
}

/// Outcome of a validation request. Rejections are data, not errors.
#[derive(Debug, Clone, Serialize)]
pub struct CouponValidation {
    pub valid: bool,
    pub code: String,
    pub discount_amount: Decimal,
    pub message: String,
    /// Rejection code such as `COUPON_EXPIRED`; absent when valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
}

impl CouponValidation {
    fn accepted(code: String, discount_amount: Decimal) -> Self {
        Self {
            valid: true,
            code,
            discount_amount,
            message: "coupon applied".to_string(),
            error_code: None,
        }
    }

    fn rejected(code: String, rejection: CouponRejection) -> Self {
        Self {
            valid: false,
            code,
            discount_amount: Decimal::ZERO,
            message: rejection.to_string(),
            error_code: Some(rejection.code()),
        }
    }
}

/// A coupon that passed every rule, with its discount.
#[derive(Debug, Clone)]
pub struct AppliedCoupon {
    pub coupon: Coupon,
    pub discount: Decimal,
}

/// Evaluate `coupon` (as looked up by code) for `user_id` against `lines`.
///
/// Shipping for a free-shipping coupon is what `rule` would charge on the
/// undiscounted subtotal.
///
/// # Errors
///
/// Returns `AppError::Coupon` with the first failing rule, or
/// `AppError::Database` if the usage lookup fails.
pub async fn evaluate(
    db: impl PgExecutor<'_>,
    coupon: Option<Coupon>,
    user_id: UserId,
    lines: &[CouponLine],
    rule: ShippingRule,
    now: DateTime<Utc>,
) -> Result<AppliedCoupon> {
    let coupon = coupon.ok_or(CouponRejection::NotFound)?;
    let user_usage_count = if coupon.usage_limit_per_user.is_some() {
        coupons::usage_count_for_user(db, coupon.id, user_id).await?
    } else {
        0
    };
    let subtotal: Decimal = lines.iter().map(|l| l.line_total).sum();

    let discount = coupon.evaluate(&CouponCheck {
        lines,
        user_usage_count,
        shipping_cost: rule.cost_for(subtotal),
        now,
    })?;
    Ok(AppliedCoupon { coupon, discount })
}

/// The single line a bare validation request is checked as.
///
/// The line takes the first requested category the coupon covers, else the
/// first requested category, else the nil category (which no coupon lists).
fn validation_line(coupon: Option<&Coupon>, request: &ValidateCoupon) -> CouponLine {
    let category_id = coupon
        .and_then(|c| request.category_ids.iter().find(|id| c.applies_to(**id)))
        .or_else(|| request.category_ids.first())
        .copied()
        .unwrap_or_else(|| CategoryId::new(Uuid::nil()));
    CouponLine {
        category_id,
        line_total: request.order_amount,
    }
}

pub struct CouponService<'a> {
    state: &'a AppState,
}

impl<'a> CouponService<'a> {
    #[must_use]
    pub const fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// # Errors
    ///
    /// Returns `AppError::Conflict` (`COUPON_CODE_EXISTS`) for a duplicate
    /// code and `AppError::Validation` for bad input.
    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create(&self, input: CouponInput) -> Result<Coupon> {
        let fields = input.into_fields()?;
        if coupons::exists_with_code(self.state.pool(), &fields.code).await? {
            return Err(duplicate_code(&fields.code));
        }
        let coupon = coupons::create(self.state.pool(), &fields)
            .await
            .map_err(|e| map_code_conflict(e, &fields.code))?;
        tracing::info!(coupon_id = %coupon.id, code = %coupon.code, "Coupon created");
        Ok(coupon)
    }

    /// # Errors
    ///
    /// Same as [`CouponService::create`], plus `NotFound`.
    #[instrument(skip(self, input))]
    pub async fn update(&self, id: CouponId, input: CouponInput) -> Result<Coupon> {
        let fields = input.into_fields()?;
        coupons::update(self.state.pool(), id, &fields)
            .await
            .map_err(|e| map_code_conflict(e, &fields.code))
    }

    /// # Errors
    ///
    /// Returns `AppError::Database` (not found) if the coupon does not exist.
    pub async fn delete(&self, id: CouponId) -> Result<()> {
        coupons::soft_delete(self.state.pool(), id).await?;
        tracing::info!(coupon_id = %id, "Coupon deleted");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `AppError::Database` if the query fails.
    pub async fn list(&self, page: PageRequest) -> Result<Page<Coupon>> {
        let (items, total) = coupons::list(self.state.pool(), page).await?;
        Ok(Page::new(items, page, total))
    }

    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the coupon does not exist.
    pub async fn get(&self, id: CouponId) -> Result<Coupon> {
        coupons::get(self.state.pool(), id)
            .await?
            .ok_or_else(|| AppError::not_found("coupon not found"))
    }

    /// Check a code against an order amount without storing anything.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for a negative amount.
    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn validate(&self, user_id: UserId, request: &ValidateCoupon) -> Result<CouponValidation> {
        if request.order_amount < Decimal::ZERO {
            return Err(AppError::validation("order_amount must not be negative"));
        }
        let code = normalize_code(&request.code);
        let coupon = coupons::get_by_code(self.state.pool(), &code).await?;
        let line = validation_line(coupon.as_ref(), request);

        match evaluate(
            self.state.pool(),
            coupon,
            user_id,
            &[line],
            self.state.shipping_rule(),
            Utc::now(),
        )
        .await
        {
            Ok(applied) => Ok(CouponValidation::accepted(code, applied.discount)),
            Err(AppError::Coupon(rejection)) => Ok(CouponValidation::rejected(code, rejection)),
            Err(other) => Err(other),
        }
    }
}

fn duplicate_code(code: &str) -> AppError {
    AppError::conflict(
        "COUPON_CODE_EXISTS",
        format!("a coupon with code {code} already exists"),
    )
}

fn map_code_conflict(err: crate::db::RepositoryError, code: &str) -> AppError {
    match err {
        crate::db::RepositoryError::Conflict(_) => duplicate_code(code),
        other => AppError::Database(other),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn input(discount_type: DiscountType, value: &str) -> CouponInput {
        let now = Utc::now();
        CouponInput {
            code: " summer-24 ".to_string(),
            description: None,
            discount_type,
            discount_value: dec(value),
            minimum_order_amount: None,
            maximum_discount_amount: None,
            usage_limit: None,
            usage_limit_per_user: None,
            applicable_category_ids: Vec::new(),
            starts_at: now,
            expires_at: now + Duration::days(30),
            is_active: true,
        }
    }

    #[test]
    fn test_code_normalized() {
        let fields = input(DiscountType::Percentage, "10").into_fields().unwrap();
        assert_eq!(fields.code, "SUMMER-24");
    }

    #[test]
    fn test_code_pattern() {
        for bad in ["AB", "HAS SPACE", "EMOJI🎉", &"X".repeat(33)] {
            let mut i = input(DiscountType::Percentage, "10");
            i.code = bad.to_string();
            assert!(i.into_fields().is_err(), "{bad} should be rejected");
        }
        let mut ok = input(DiscountType::Percentage, "10");
        ok.code = "a_b-9".to_string();
        assert_eq!(ok.into_fields().unwrap().code, "A_B-9");
    }

    #[test]
    fn test_code_length_bounds() {
        assert!(is_valid_code("ABC"));
        assert!(is_valid_code(&"Z".repeat(32)));
        assert!(!is_valid_code(&"Z".repeat(33)));
        assert!(!is_valid_code("abc"));
        assert!(!is_valid_code("ABC\n"));
    }

    #[test]
    fn test_percentage_bounds() {
        assert!(input(DiscountType::Percentage, "0").into_fields().is_err());
        assert!(input(DiscountType::Percentage, "100.01").into_fields().is_err());
        assert!(input(DiscountType::Percentage, "100").into_fields().is_ok());
    }

    #[test]
    fn test_fixed_must_be_positive() {
        assert!(input(DiscountType::FixedAmount, "0").into_fields().is_err());
        assert!(input(DiscountType::FixedAmount, "5").into_fields().is_ok());
    }

    #[test]
    fn test_free_shipping_ignores_value() {
        let fields = input(DiscountType::FreeShipping, "0").into_fields().unwrap();
        assert_eq!(fields.discount_value, Decimal::ZERO);
    }

    #[test]
    fn test_window_must_be_forward() {
        let mut i = input(DiscountType::Percentage, "10");
        i.expires_at = i.starts_at;
        assert!(i.into_fields().is_err());
    }

    #[test]
    fn test_duplicate_code_error() {
        let err = duplicate_code("SUMMER-24");
        assert_eq!(err.code(), "COUPON_CODE_EXISTS");
        assert_eq!(err.status(), axum::http::StatusCode::CONFLICT);

        let mapped = map_code_conflict(
            crate::db::RepositoryError::Conflict("coupon code already exists".to_string()),
            "SUMMER-24",
        );
        assert_eq!(mapped.code(), "COUPON_CODE_EXISTS");
    }

    #[test]
    fn test_rejected_validation_body() {
        let v = CouponValidation::rejected("OLD".to_string(), CouponRejection::Expired);
        assert!(!v.valid);
        assert_eq!(v.error_code, Some("COUPON_EXPIRED"));
        assert_eq!(v.discount_amount, Decimal::ZERO);
    }

    #[test]
    fn test_validation_line_prefers_covered_category() {
        let covered = CategoryId::generate();
        let other = CategoryId::generate();
        let now = Utc::now();
        let coupon = Coupon {
            id: CouponId::generate(),
            code: "KITCHEN".to_string(),
            description: None,
            discount_type: DiscountType::Percentage,
            discount_value: dec("10"),
            minimum_order_amount: None,
            maximum_discount_amount: None,
            usage_limit: None,
            usage_limit_per_user: None,
            used_count: 0,
            applicable_category_ids: vec![covered],
            starts_at: now - Duration::days(1),
            expires_at: now + Duration::days(1),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let request = ValidateCoupon {
            code: "kitchen".to_string(),
            order_amount: dec("80"),
            category_ids: vec![other, covered],
        };
        assert_eq!(validation_line(Some(&coupon), &request).category_id, covered);

        let uncovered = ValidateCoupon {
            category_ids: vec![other],
            ..request.clone()
        };
        let line = validation_line(Some(&coupon), &uncovered);
        assert!(!coupon.applies_to(line.category_id));
        assert_eq!(line.line_total, dec("80"));
    }
}
