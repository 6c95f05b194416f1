//! Payments and refunds.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use emporium_core::{OrderId, PaymentId, PaymentMethod, PaymentStatus, round_money};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    /// Gateway transaction reference.
    pub provider_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub refunded_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Why a refund request is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefundError {
    #[error("payment is {0} and cannot be refunded")]
    NotRefundable(PaymentStatus),
    #[error("refund amount must be positive")]
    NonPositive,
    #[error("refund exceeds the remaining refundable amount of {0}")]
    ExceedsRemaining(Decimal),
}

/// State of a payment after a refund is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundOutcome {
    pub refund: Decimal,
    pub refunded_amount: Decimal,
    pub status: PaymentStatus,
}

impl Payment {
    #[must_use]
    pub fn remaining_refundable(&self) -> Decimal {
        (self.amount - self.refunded_amount).max(Decimal::ZERO)
    }

    /// Apply a refund of `amount`, or of everything remaining when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`RefundError`] when the payment is not refundable or the
    /// cumulative refund would exceed the charged amount.
    pub fn plan_refund(&self, amount: Option<Decimal>) -> Result<RefundOutcome, RefundError> {
        if !self.status.is_refundable() {
            return Err(RefundError::NotRefundable(self.status));
        }
        let remaining = self.remaining_refundable();
        let refund = round_money(amount.unwrap_or(remaining));
        if refund <= Decimal::ZERO {
            return Err(RefundError::NonPositive);
        }
        if refund > remaining {
            return Err(RefundError::ExceedsRemaining(remaining));
        }

        let refunded_amount = self.refunded_amount + refund;
        let status = if refunded_amount >= self.amount {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::PartiallyRefunded
        };
        Ok(RefundOutcome {
            refund,
            refunded_amount,
            status,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn payment(status: PaymentStatus, amount: &str, refunded: &str) -> Payment {
        Payment {
            id: PaymentId::generate(),
            order_id: OrderId::generate(),
            amount: dec(amount),
            method: PaymentMethod::CreditCard,
            status,
            provider_reference: Some("sbx_1".to_string()),
            failure_reason: None,
            refunded_amount: dec(refunded),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_full_refund_by_default() {
        let outcome = payment(PaymentStatus::Completed, "100.00", "0")
            .plan_refund(None)
            .unwrap();
        assert_eq!(outcome.refund, dec("100.00"));
        assert_eq!(outcome.status, PaymentStatus::Refunded);
    }

    #[test]
    fn test_partial_then_rest() {
        let p = payment(PaymentStatus::Completed, "100.00", "0");
        let first = p.plan_refund(Some(dec("40.00"))).unwrap();
        assert_eq!(first.status, PaymentStatus::PartiallyRefunded);

        let p = payment(PaymentStatus::PartiallyRefunded, "100.00", "40.00");
        assert_eq!(
            p.plan_refund(Some(dec("60.01"))),
            Err(RefundError::ExceedsRemaining(dec("60.00")))
        );
        assert_eq!(p.plan_refund(Some(dec("60.00"))).unwrap().status, PaymentStatus::Refunded);
    }

    #[test]
    fn test_only_settled_payments_refund() {
        for status in [PaymentStatus::Pending, PaymentStatus::Failed, PaymentStatus::Refunded] {
            let p = payment(status, "10.00", "0");
            assert_eq!(p.plan_refund(None), Err(RefundError::NotRefundable(status)));
        }
    }

    #[test]
    fn test_non_positive_refund() {
        let p = payment(PaymentStatus::Completed, "10.00", "0");
        assert_eq!(p.plan_refund(Some(dec("0"))), Err(RefundError::NonPositive));
    }
}
