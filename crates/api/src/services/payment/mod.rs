//! Charging orders and refunding payments.

mod gateway;

pub use gateway::{
    ChargeOutcome, ChargeRequest, GatewayError, HttpPaymentGateway, PaymentGateway, SandboxGateway,
};

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use emporium_core::{
    NotificationKind, OrderId, OrderStatus, PaymentId, PaymentMethod, PaymentStatus, UserId,
};

use crate::db::{RepositoryError, UnitOfWork, orders, payments};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::models::payment::RefundError;
use crate::models::{NewNotification, Order, Payment};
use crate::services::notification::notify_quietly;
use crate::services::order::announce_status_change;
use crate::state::AppState;

/// Body of `POST /api/payments`.
#[derive(Debug, Clone, Deserialize)]
pub struct PayOrder {
    pub order_id: OrderId,
    /// Defaults to the method chosen at checkout.
    pub method: Option<PaymentMethod>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefundRequest {
    /// Everything still refundable when absent.
    pub amount: Option<Decimal>,
}

/// Map a refused refund to the API error.
fn refund_error(err: &RefundError) -> AppError {
    match err {
        RefundError::NotRefundable(_) => AppError::conflict("PAYMENT_NOT_REFUNDABLE", err.to_string()),
        RefundError::NonPositive | RefundError::ExceedsRemaining(_) => {
            AppError::validation(err.to_string())
        }
    }
}

/// Check the order can be paid by `user_id`.
fn ensure_payable(order: &Order, user_id: UserId) -> Result<()> {
    if order.user_id != user_id {
        return Err(AppError::not_found("order not found"));
    }
    if order.status != OrderStatus::Pending {
        return Err(AppError::conflict(
            "ORDER_NOT_PAYABLE",
            format!("an order that is {} cannot be paid", order.status),
        ));
    }
    Ok(())
}

/// Reject a charge while another payment on the order is settled or in flight.
fn ensure_chargeable(blocking: Option<PaymentStatus>) -> Result<()> {
    match blocking {
        None | Some(PaymentStatus::Failed) => Ok(()),
        Some(PaymentStatus::Pending) => Err(payment_in_progress()),
        Some(_) => Err(AppError::conflict(
            "PAYMENT_ALREADY_COMPLETED",
            "this order has already been paid",
        )),
    }
}

fn payment_in_progress() -> AppError {
    AppError::conflict(
        "PAYMENT_IN_PROGRESS",
        "a payment for this order is already being processed",
    )
}

pub struct PaymentService<'a> {
    state: &'a AppState,
}

impl<'a> PaymentService<'a> {
    #[must_use]
    pub const fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Charge the order total through the configured gateway.
    ///
    /// The pending payment row is committed before the gateway is called so
    /// every attempt leaves a record. While it is pending no second charge
    /// can start on the same order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::PaymentDeclined` when the gateway declines,
    /// `AppError::Gateway` when it cannot be reached,
    /// `PAYMENT_IN_PROGRESS` while another charge is pending and
    /// `PAYMENT_ALREADY_COMPLETED` when the order is already paid.
    #[instrument(skip(self))]
    pub async fn pay(&self, user_id: UserId, request: PayOrder) -> Result<Payment> {
        let pool = self.state.pool();

        let mut uow = UnitOfWork::begin(pool).await?;
        let order = orders::lock(uow.conn(), request.order_id)
            .await?
            .ok_or_else(|| AppError::not_found("order not found"))?;
        ensure_payable(&order, user_id)?;
        ensure_chargeable(payments::blocking_status(uow.conn(), order.id).await?)?;
        let method = request.method.unwrap_or(order.payment_method);
        let payment = payments::create_pending(uow.conn(), order.id, order.total, method)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => payment_in_progress(),
                other => other.into(),
            })?;
        uow.commit().await?;

        let charge = ChargeRequest {
            order_id: order.id,
            order_number: &order.order_number,
            amount: payment.amount,
            currency: self.state.config().currency.code(),
            method,
        };
        let outcome = match self.state.gateway().charge(&charge).await {
            Ok(outcome) => outcome,
            Err(e) => {
                payments::settle(pool, payment.id, PaymentStatus::Failed, None, Some("gateway unavailable"))
                    .await?;
                return Err(e.into());
            }
        };

        match outcome {
            ChargeOutcome::Declined { reason } => {
                payments::settle(pool, payment.id, PaymentStatus::Failed, None, Some(&reason)).await?;
                tracing::info!(payment_id = %payment.id, %reason, "Payment declined");
                notify_quietly(
                    pool,
                    &NewNotification::new(
                        user_id,
                        NotificationKind::Payment,
                        format!("Payment for {} failed", order.order_number),
                        format!("Your payment was declined: {reason}"),
                    )
                    .with_reference(order.id),
                )
                .await;
                Err(AppError::PaymentDeclined(reason))
            }
            ChargeOutcome::Approved { reference } => {
                let mut uow = UnitOfWork::begin(pool).await?;
                let settled = payments::settle(
                    uow.conn(),
                    payment.id,
                    PaymentStatus::Completed,
                    Some(&reference),
                    None,
                )
                .await?;
                let current = orders::lock(uow.conn(), order.id)
                    .await?
                    .ok_or_else(|| AppError::not_found("order not found"))?;
                let confirmed = if current.status == OrderStatus::Pending {
                    Some(orders::set_status(uow.conn(), order.id, OrderStatus::Confirmed).await?)
                } else {
                    None
                };
                uow.commit().await?;

                tracing::info!(payment_id = %settled.id, amount = %settled.amount, "Payment completed");
                add_breadcrumb(
                    "payment",
                    "Payment completed",
                    Some(&[("order_number", order.order_number.as_str())]),
                );
                notify_quietly(
                    pool,
                    &NewNotification::new(
                        user_id,
                        NotificationKind::Payment,
                        format!("Payment for {} received", order.order_number),
                        format!("We received your payment of {}.", settled.amount),
                    )
                    .with_reference(order.id),
                )
                .await;
                if let Some(confirmed) = confirmed {
                    announce_status_change(self.state, &confirmed, OrderStatus::Pending).await;
                }
                Ok(settled)
            }
        }
    }

    /// Refund a settled payment, fully when `amount` is `None`.
    ///
    /// # Errors
    ///
    /// Returns `PAYMENT_NOT_REFUNDABLE` for unsettled payments and
    /// `AppError::Validation` when the refund exceeds what remains.
    #[instrument(skip(self, request))]
    pub async fn refund(&self, id: PaymentId, request: RefundRequest) -> Result<Payment> {
        let pool = self.state.pool();
        let mut uow = UnitOfWork::begin(pool).await?;
        let payment = payments::lock(uow.conn(), id)
            .await?
            .ok_or_else(|| AppError::not_found("payment not found"))?;
        let outcome = payment
            .plan_refund(request.amount)
            .map_err(|e| refund_error(&e))?;

        if let Some(reference) = payment.provider_reference.as_deref() {
            let refund_reference = self.state.gateway().refund(reference, outcome.refund).await?;
            tracing::debug!(%refund_reference, "Gateway refund accepted");
        }

        let updated =
            payments::record_refund(uow.conn(), id, outcome.refunded_amount, outcome.status).await?;

        let mut refunded_order = None;
        if outcome.status == PaymentStatus::Refunded
            && let Some(order) = orders::lock(uow.conn(), payment.order_id).await?
            && order.status.can_transition_to(OrderStatus::Refunded)
        {
            let order = orders::set_status(uow.conn(), order.id, OrderStatus::Refunded).await?;
            refunded_order = Some(order);
        }
        uow.commit().await?;

        tracing::info!(payment_id = %id, refund = %outcome.refund, status = %outcome.status, "Refund recorded");

        if let Some(order) = orders::get(pool, payment.order_id).await? {
            notify_quietly(
                pool,
                &NewNotification::new(
                    order.user_id,
                    NotificationKind::Payment,
                    format!("Refund for {}", order.order_number),
                    format!("A refund of {} is on its way.", outcome.refund),
                )
                .with_reference(order.id),
            )
            .await;
        }
        if let Some(order) = refunded_order {
            announce_status_change(self.state, &order, OrderStatus::Delivered).await;
        }
        Ok(updated)
    }

    /// `owner` restricts the lookup to that user's orders; `None` for admins.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown or foreign payment.
    pub async fn get(&self, id: PaymentId, owner: Option<UserId>) -> Result<Payment> {
        let pool = self.state.pool();
        let payment = payments::get(pool, id)
            .await?
            .ok_or_else(|| AppError::not_found("payment not found"))?;
        if let Some(user_id) = owner {
            self.owned_order(payment.order_id, user_id).await?;
        }
        Ok(payment)
    }

    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown or foreign order.
    pub async fn list_for_order(&self, order_id: OrderId, owner: Option<UserId>) -> Result<Vec<Payment>> {
        match owner {
            Some(user_id) => {
                self.owned_order(order_id, user_id).await?;
            }
            None => {
                orders::get(self.state.pool(), order_id)
                    .await?
                    .ok_or_else(|| AppError::not_found("order not found"))?;
            }
        }
        Ok(payments::list_for_order(self.state.pool(), order_id).await?)
    }

    async fn owned_order(&self, order_id: OrderId, user_id: UserId) -> Result<Order> {
        orders::get(self.state.pool(), order_id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| AppError::not_found("payment not found"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::ShippingAddress;
    use crate::models::product::tests::dec;

    fn order(user_id: UserId, status: OrderStatus) -> Order {
        Order {
            id: OrderId::generate(),
            order_number: "ORD-20260101-AAAAAA".to_string(),
            user_id,
            status,
            subtotal: dec("50.00"),
            discount_amount: Decimal::ZERO,
            shipping_cost: dec("29.90"),
            total: dec("79.90"),
            coupon_code: None,
            payment_method: PaymentMethod::CreditCard,
            shipping: ShippingAddress {
                name: "Ada".to_string(),
                phone: "1".to_string(),
                line1: "x".to_string(),
                line2: None,
                city: "y".to_string(),
                postal_code: "z".to_string(),
                country: "GB".to_string(),
            },
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_ensure_payable() {
        let user = UserId::generate();
        assert!(ensure_payable(&order(user, OrderStatus::Pending), user).is_ok());

        let err = ensure_payable(&order(user, OrderStatus::Pending), UserId::generate()).unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");

        let err = ensure_payable(&order(user, OrderStatus::Confirmed), user).unwrap_err();
        assert_eq!(err.code(), "ORDER_NOT_PAYABLE");
    }

    #[test]
    fn test_pending_payment_blocks_second_charge() {
        assert!(ensure_chargeable(None).is_ok());
        assert!(ensure_chargeable(Some(PaymentStatus::Failed)).is_ok());
        assert_eq!(
            ensure_chargeable(Some(PaymentStatus::Pending)).unwrap_err().code(),
            "PAYMENT_IN_PROGRESS"
        );
        for settled in [
            PaymentStatus::Completed,
            PaymentStatus::PartiallyRefunded,
            PaymentStatus::Refunded,
        ] {
            assert_eq!(
                ensure_chargeable(Some(settled)).unwrap_err().code(),
                "PAYMENT_ALREADY_COMPLETED"
            );
        }
    }

    #[test]
    fn test_refund_error_mapping() {
        assert_eq!(
            refund_error(&RefundError::NotRefundable(PaymentStatus::Failed)).code(),
            "PAYMENT_NOT_REFUNDABLE"
        );
        assert_eq!(
            refund_error(&RefundError::ExceedsRemaining(dec("5.00"))).code(),
            "VALIDATION_ERROR"
        );
    }
}
