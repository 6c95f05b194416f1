//! Coupons and the discount rules that govern them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use emporium_core::{CategoryId, CouponId, DiscountType, round_money};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Coupon {
    pub id: CouponId,
    /// Always upper case.
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    /// Percent for `percentage`, currency amount for `fixed_amount`, unused for `free_shipping`.
    pub discount_value: Decimal,
    pub minimum_order_amount: Option<Decimal>,
    pub maximum_discount_amount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub usage_limit_per_user: Option<i32>,
    pub used_count: i32,
    /// Empty means every category is eligible.
    pub applicable_category_ids: Vec<CategoryId>,
    pub starts_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Why a coupon cannot be applied, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CouponRejection {
    #[error("coupon not found")]
    NotFound,
    #[error("coupon is not active")]
    Inactive,
    #[error("coupon is not valid yet")]
    NotStarted,
    #[error("coupon has expired")]
    Expired,
    #[error("coupon usage limit reached")]
    UsageLimitReached,
    #[error("you have already used this coupon the maximum number of times")]
    UserLimitReached,
    #[error("order does not meet the coupon minimum amount")]
    MinimumNotMet,
    #[error("coupon does not apply to any item in this order")]
    NotApplicable,
}

impl CouponRejection {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotFound => "COUPON_NOT_FOUND",
            Self::Inactive => "COUPON_INACTIVE",
            Self::NotStarted => "COUPON_NOT_STARTED",
            Self::Expired => "COUPON_EXPIRED",
            Self::UsageLimitReached => "COUPON_USAGE_LIMIT_REACHED",
            Self::UserLimitReached => "COUPON_USER_LIMIT_REACHED",
            Self::MinimumNotMet => "COUPON_MINIMUM_NOT_MET",
            Self::NotApplicable => "COUPON_NOT_APPLICABLE",
        }
    }
}

/// One priced line the coupon is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct CouponLine {
    pub category_id: CategoryId,
    pub line_total: Decimal,
}

/// Everything outside the coupon row that validation depends on.
#[derive(Debug, Clone)]
pub struct CouponCheck<'a> {
    pub lines: &'a [CouponLine],
    /// Prior redemptions of this coupon by the current user.
    pub user_usage_count: i64,
    /// Shipping that would be charged without the coupon.
    pub shipping_cost: Decimal,
    pub now: DateTime<Utc>,
}

impl CouponCheck<'_> {
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.lines.iter().map(|l| l.line_total).sum()
    }
}

impl Coupon {
    #[must_use]
    pub fn has_remaining_uses(&self) -> bool {
        self.usage_limit.is_none_or(|limit| self.used_count < limit)
    }

    #[must_use]
    pub fn applies_to(&self, category_id: CategoryId) -> bool {
        self.applicable_category_ids.is_empty() || self.applicable_category_ids.contains(&category_id)
    }

    /// Sum of line totals in eligible categories.
    #[must_use]
    pub fn eligible_amount(&self, lines: &[CouponLine]) -> Decimal {
        lines
            .iter()
            .filter(|l| self.applies_to(l.category_id))
            .map(|l| l.line_total)
            .sum()
    }

    /// Run every rule in order and return the discount on success.
    ///
    /// # Errors
    ///
    /// Returns the first [`CouponRejection`] that applies.
    pub fn evaluate(&self, check: &CouponCheck<'_>) -> Result<Decimal, CouponRejection> {
        if !self.is_active {
            return Err(CouponRejection::Inactive);
        }
        if check.now < self.starts_at {
            return Err(CouponRejection::NotStarted);
        }
        if check.now >= self.expires_at {
            return Err(CouponRejection::Expired);
        }
        if !self.has_remaining_uses() {
            return Err(CouponRejection::UsageLimitReached);
        }
        if let Some(per_user) = self.usage_limit_per_user
            && check.user_usage_count >= i64::from(per_user)
        {
            return Err(CouponRejection::UserLimitReached);
        }
        if let Some(minimum) = self.minimum_order_amount
            && check.subtotal() < minimum
        {
            return Err(CouponRejection::MinimumNotMet);
        }

        let eligible = self.eligible_amount(check.lines);
        if !self.applicable_category_ids.is_empty() && eligible.is_zero() {
            return Err(CouponRejection::NotApplicable);
        }

        Ok(self.discount_for(eligible, check.shipping_cost))
    }

    /// Discount for an eligible amount, rounded and clamped to `[0, eligible]`.
    ///
    /// Free shipping is the exception: it equals the shipping cost.
    #[must_use]
    pub fn discount_for(&self, eligible: Decimal, shipping_cost: Decimal) -> Decimal {
        let raw = match self.discount_type {
            DiscountType::Percentage => {
                let amount = eligible * self.discount_value / Decimal::ONE_HUNDRED;
                self.maximum_discount_amount.map_or(amount, |cap| amount.min(cap))
            }
            DiscountType::FixedAmount => self.discount_value.min(eligible),
            DiscountType::FreeShipping => return round_money(shipping_cost.max(Decimal::ZERO)),
        };
        round_money(raw.max(Decimal::ZERO).min(eligible))
    }

    /// Free-shipping coupons discount shipping rather than merchandise.
    #[must_use]
    pub fn is_free_shipping(&self) -> bool {
        self.discount_type == DiscountType::FreeShipping
    }
}

/// Normalize a user-entered code: trimmed and upper-cased.
#[must_use]
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn coupon(discount_type: DiscountType, value: &str) -> Coupon {
        let now = Utc::now();
        Coupon {
            id: CouponId::generate(),
            code: "SAVE10".to_string(),
            description: None,
            discount_type,
            discount_value: dec(value),
            minimum_order_amount: None,
            maximum_discount_amount: None,
            usage_limit: None,
            usage_limit_per_user: None,
            used_count: 0,
            applicable_category_ids: Vec::new(),
            starts_at: now - Duration::days(1),
            expires_at: now + Duration::days(1),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn check(lines: &[CouponLine]) -> CouponCheck<'_> {
        CouponCheck {
            lines,
            user_usage_count: 0,
            shipping_cost: dec("29.90"),
            now: Utc::now(),
        }
    }

    fn line(category_id: CategoryId, total: &str) -> CouponLine {
        CouponLine {
            category_id,
            line_total: dec(total),
        }
    }

    #[test]
    fn test_percentage_discount() {
        let lines = [line(CategoryId::generate(), "200.00")];
        let c = coupon(DiscountType::Percentage, "15");
        assert_eq!(c.evaluate(&check(&lines)).unwrap(), dec("30.00"));
    }

    #[test]
    fn test_percentage_respects_cap() {
        let lines = [line(CategoryId::generate(), "1000.00")];
        let mut c = coupon(DiscountType::Percentage, "50");
        c.maximum_discount_amount = Some(dec("100.00"));
        assert_eq!(c.evaluate(&check(&lines)).unwrap(), dec("100.00"));
    }

    #[test]
    fn test_fixed_amount_never_exceeds_eligible() {
        let lines = [line(CategoryId::generate(), "20.00")];
        let c = coupon(DiscountType::FixedAmount, "50.00");
        assert_eq!(c.evaluate(&check(&lines)).unwrap(), dec("20.00"));
    }

    #[test]
    fn test_free_shipping_equals_shipping_cost() {
        let lines = [line(CategoryId::generate(), "20.00")];
        let c = coupon(DiscountType::FreeShipping, "0");
        assert_eq!(c.evaluate(&check(&lines)).unwrap(), dec("29.90"));
    }

    #[test]
    fn test_percentage_rounds_to_cents() {
        let lines = [line(CategoryId::generate(), "33.33")];
        let c = coupon(DiscountType::Percentage, "10");
        assert_eq!(c.evaluate(&check(&lines)).unwrap(), dec("3.33"));
    }

    #[test]
    fn test_expired_coupon_rejected() {
        let lines = [line(CategoryId::generate(), "100.00")];
        let mut c = coupon(DiscountType::Percentage, "10");
        c.starts_at = Utc::now() - Duration::days(10);
        c.expires_at = Utc::now() - Duration::days(1);
        assert_eq!(c.evaluate(&check(&lines)), Err(CouponRejection::Expired));
        assert_eq!(CouponRejection::Expired.code(), "COUPON_EXPIRED");
    }

    #[test]
    fn test_not_started_coupon_rejected() {
        let lines = [line(CategoryId::generate(), "100.00")];
        let mut c = coupon(DiscountType::Percentage, "10");
        c.starts_at = Utc::now() + Duration::days(1);
        c.expires_at = Utc::now() + Duration::days(5);
        assert_eq!(c.evaluate(&check(&lines)), Err(CouponRejection::NotStarted));
    }

    #[test]
    fn test_rules_checked_in_order() {
        // Inactive, expired, exhausted and below minimum: inactive wins.
        let lines = [line(CategoryId::generate(), "10.00")];
        let mut c = coupon(DiscountType::Percentage, "10");
        c.is_active = false;
        c.expires_at = Utc::now() - Duration::hours(1);
        c.starts_at = Utc::now() - Duration::days(2);
        c.usage_limit = Some(1);
        c.used_count = 1;
        c.minimum_order_amount = Some(dec("500.00"));
        assert_eq!(c.evaluate(&check(&lines)), Err(CouponRejection::Inactive));

        c.is_active = true;
        assert_eq!(c.evaluate(&check(&lines)), Err(CouponRejection::Expired));

        c.expires_at = Utc::now() + Duration::days(1);
        assert_eq!(c.evaluate(&check(&lines)), Err(CouponRejection::UsageLimitReached));

        c.usage_limit = None;
        assert_eq!(c.evaluate(&check(&lines)), Err(CouponRejection::MinimumNotMet));
    }

    #[test]
    fn test_user_limit() {
        let lines = [line(CategoryId::generate(), "100.00")];
        let mut c = coupon(DiscountType::Percentage, "10");
        c.usage_limit_per_user = Some(1);
        let mut ctx = check(&lines);
        ctx.user_usage_count = 1;
        assert_eq!(c.evaluate(&ctx), Err(CouponRejection::UserLimitReached));
    }

    #[test]
    fn test_category_restriction() {
        let eligible = CategoryId::generate();
        let other = CategoryId::generate();
        let mut c = coupon(DiscountType::Percentage, "10");
        c.applicable_category_ids = vec![eligible];

        let none = [line(other, "100.00")];
        assert_eq!(c.evaluate(&check(&none)), Err(CouponRejection::NotApplicable));

        let mixed = [line(eligible, "50.00"), line(other, "100.00")];
        assert_eq!(c.evaluate(&check(&mixed)).unwrap(), dec("5.00"));
    }

    #[test]
    fn test_discount_never_negative() {
        let c = coupon(DiscountType::FixedAmount, "10.00");
        assert_eq!(c.discount_for(Decimal::ZERO, Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("  save10 "), "SAVE10");
    }
}
