//! Transactional email over SMTP.
//!
//! Uses lettre for delivery with Askama HTML and plain text templates. Every
//! message is written to `email_logs` before it is sent and marked sent or
//! failed afterwards, so failed mail can be retried.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;

use emporium_core::{CurrencyCode, OrderStatus};

use crate::config::EmailConfig;
use crate::db::{RepositoryError, emails};
use crate::models::order::OrderDetail;
use crate::models::{Cargo, EmailLog, TrackingEvent, User};

/// Failed logs picked up by one retry sweep.
const RETRY_BATCH: i64 = 100;

/// One line of an order summary.
struct EmailLine<'a> {
    name: &'a str,
    sku: &'a str,
    quantity: i32,
    line_total: Decimal,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    customer_name: &'a str,
    order_number: &'a str,
    items: &'a [EmailLine<'a>],
    currency: &'a str,
    subtotal: Decimal,
    has_discount: bool,
    discount: Decimal,
    shipping: Decimal,
    total: Decimal,
    address_name: &'a str,
    address_line: &'a str,
    address_city: &'a str,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    customer_name: &'a str,
    order_number: &'a str,
    items: &'a [EmailLine<'a>],
    currency: &'a str,
    subtotal: Decimal,
    has_discount: bool,
    discount: Decimal,
    shipping: Decimal,
    total: Decimal,
    address_name: &'a str,
    address_line: &'a str,
    address_city: &'a str,
}

#[derive(Template)]
#[template(path = "email/order_status.html")]
struct OrderStatusHtml<'a> {
    customer_name: &'a str,
    order_number: &'a str,
    previous_status: &'a str,
    status: &'a str,
}

#[derive(Template)]
#[template(path = "email/order_status.txt")]
struct OrderStatusText<'a> {
    customer_name: &'a str,
    order_number: &'a str,
    previous_status: &'a str,
    status: &'a str,
}

#[derive(Template)]
#[template(path = "email/shipment_update.html")]
struct ShipmentUpdateHtml<'a> {
    customer_name: &'a str,
    order_number: &'a str,
    status: &'a str,
    carrier: &'a str,
    tracking_number: &'a str,
    location: Option<&'a str>,
    description: &'a str,
}

#[derive(Template)]
#[template(path = "email/shipment_update.txt")]
struct ShipmentUpdateText<'a> {
    customer_name: &'a str,
    order_number: &'a str,
    status: &'a str,
    carrier: &'a str,
    tracking_number: &'a str,
    location: Option<&'a str>,
    description: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    /// The email log could not be written.
    #[error("Email log error: {0}")]
    Log(#[from] RepositoryError),
}

/// Counts from one retry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetryReport {
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
}

#[derive(Clone)]
struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

/// Email service for sending transactional emails.
///
/// Without SMTP configuration every send is skipped.
#[derive(Clone)]
pub struct EmailService {
    mailer: Option<Mailer>,
    currency: CurrencyCode,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns `EmailError::Smtp` if the relay cannot be configured, or
    /// `EmailError::InvalidAddress` for a malformed sender.
    pub fn new(config: Option<&EmailConfig>, currency: CurrencyCode) -> Result<Self, EmailError> {
        let Some(config) = config else {
            return Ok(Self::disabled(currency));
        };

        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();
        let from = config
            .from_address
            .parse()
            .map_err(|_| EmailError::InvalidAddress(config.from_address.clone()))?;

        Ok(Self {
            mailer: Some(Mailer { transport, from }),
            currency,
        })
    }

    /// A service that skips every send.
    #[must_use]
    pub const fn disabled(currency: CurrencyCode) -> Self {
        Self {
            mailer: None,
            currency,
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.mailer.is_some()
    }

    /// Send the order confirmation.
    ///
    /// # Errors
    ///
    /// Returns error if the template fails to render or delivery fails.
    pub async fn send_order_confirmation(
        &self,
        pool: &PgPool,
        user: &User,
        detail: &OrderDetail,
    ) -> Result<(), EmailError> {
        let order = &detail.order;
        let customer_name = user.full_name();
        let lines: Vec<EmailLine<'_>> = detail
            .items
            .iter()
            .map(|item| EmailLine {
                name: &item.product_name,
                sku: &item.sku,
                quantity: item.quantity,
                line_total: item.line_total,
            })
            .collect();
        let address_line = match &order.shipping.line2 {
            Some(line2) => format!("{}, {line2}", order.shipping.line1),
            None => order.shipping.line1.clone(),
        };
        let address_city = format!(
            "{} {}, {}",
            order.shipping.postal_code, order.shipping.city, order.shipping.country
        );
        let has_discount = !order.discount_amount.is_zero();

        let html = OrderConfirmationHtml {
            customer_name: &customer_name,
            order_number: &order.order_number,
            items: &lines,
            currency: self.currency.symbol(),
            subtotal: order.subtotal,
            has_discount,
            discount: order.discount_amount,
            shipping: order.shipping_cost,
            total: order.total,
            address_name: &order.shipping.name,
            address_line: &address_line,
            address_city: &address_city,
        }
        .render()?;
        let text = OrderConfirmationText {
            customer_name: &customer_name,
            order_number: &order.order_number,
            items: &lines,
            currency: self.currency.symbol(),
            subtotal: order.subtotal,
            has_discount,
            discount: order.discount_amount,
            shipping: order.shipping_cost,
            total: order.total,
            address_name: &order.shipping.name,
            address_line: &address_line,
            address_city: &address_city,
        }
        .render()?;

        let subject = format!("Order {} confirmed", order.order_number);
        self.deliver(pool, user.email.as_str(), &subject, &html, &text)
            .await
    }

    /// Send an order status change.
    ///
    /// # Errors
    ///
    /// Returns error if the template fails to render or delivery fails.
    pub async fn send_order_status(
        &self,
        pool: &PgPool,
        user: &User,
        order_number: &str,
        previous: OrderStatus,
        status: OrderStatus,
    ) -> Result<(), EmailError> {
        let customer_name = user.full_name();
        let html = OrderStatusHtml {
            customer_name: &customer_name,
            order_number,
            previous_status: previous.as_str(),
            status: status.as_str(),
        }
        .render()?;
        let text = OrderStatusText {
            customer_name: &customer_name,
            order_number,
            previous_status: previous.as_str(),
            status: status.as_str(),
        }
        .render()?;

        let subject = format!("Order {order_number} is now {status}");
        self.deliver(pool, user.email.as_str(), &subject, &html, &text)
            .await
    }

    /// Send a shipment tracking update.
    ///
    /// # Errors
    ///
    /// Returns error if the template fails to render or delivery fails.
    pub async fn send_shipment_update(
        &self,
        pool: &PgPool,
        user: &User,
        order_number: &str,
        cargo: &Cargo,
        event: &TrackingEvent,
    ) -> Result<(), EmailError> {
        let customer_name = user.full_name();
        let html = ShipmentUpdateHtml {
            customer_name: &customer_name,
            order_number,
            status: event.status.as_str(),
            carrier: &cargo.carrier,
            tracking_number: &cargo.tracking_number,
            location: event.location.as_deref(),
            description: &event.description,
        }
        .render()?;
        let text = ShipmentUpdateText {
            customer_name: &customer_name,
            order_number,
            status: event.status.as_str(),
            carrier: &cargo.carrier,
            tracking_number: &cargo.tracking_number,
            location: event.location.as_deref(),
            description: &event.description,
        }
        .render()?;

        let subject = format!("Shipment update for order {order_number}");
        self.deliver(pool, user.email.as_str(), &subject, &html, &text)
            .await
    }

    /// Resend failed logs that still have attempts left.
    ///
    /// # Errors
    ///
    /// Returns `EmailError::Log` if the failed logs cannot be loaded.
    pub async fn retry_failed(&self, pool: &PgPool) -> Result<RetryReport, EmailError> {
        let mut report = RetryReport::default();
        let Some(mailer) = &self.mailer else {
            tracing::debug!("SMTP not configured; skipping email retry sweep");
            return Ok(report);
        };

        for log in emails::retryable(pool, RETRY_BATCH).await? {
            if !log.is_retryable() {
                continue;
            }
            report.attempted += 1;
            match attempt(pool, mailer, &log).await {
                Ok(()) => report.sent += 1,
                Err(EmailError::Log(e)) => return Err(EmailError::Log(e)),
                Err(_) => report.failed += 1,
            }
        }

        tracing::info!(
            attempted = report.attempted,
            sent = report.sent,
            failed = report.failed,
            "Email retry sweep finished"
        );
        Ok(report)
    }

    /// Log, send, then record the outcome.
    async fn deliver(
        &self,
        pool: &PgPool,
        to: &str,
        subject: &str,
        html: &str,
        text: &str,
    ) -> Result<(), EmailError> {
        let Some(mailer) = &self.mailer else {
            tracing::debug!(to = %to, subject = %subject, "SMTP not configured; email skipped");
            return Ok(());
        };

        let log = emails::create_pending(pool, to, subject, html, text).await?;
        attempt(pool, mailer, &log).await
    }
}

/// Send one logged message and record the outcome on the log.
async fn attempt(pool: &PgPool, mailer: &Mailer, log: &EmailLog) -> Result<(), EmailError> {
    match send(mailer, log).await {
        Ok(()) => {
            emails::mark_sent(pool, log.id).await?;
            tracing::info!(to = %log.recipient, subject = %log.subject, "Email sent successfully");
            Ok(())
        }
        Err(e) => {
            emails::mark_failed(pool, log.id, &e.to_string()).await?;
            tracing::warn!(
                to = %log.recipient,
                email_log_id = %log.id,
                retry_count = log.retry_count + 1,
                error = %e,
                "Email delivery failed"
            );
            Err(e)
        }
    }
}

/// Send a multipart email with both plain text and HTML versions.
async fn send(mailer: &Mailer, log: &EmailLog) -> Result<(), EmailError> {
    let email = Message::builder()
        .from(mailer.from.clone())
        .to(log
            .recipient
            .parse()
            .map_err(|_| EmailError::InvalidAddress(log.recipient.clone()))?)
        .subject(log.subject.as_str())
        .multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(log.body_text.clone()),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_HTML)
                        .body(log.body_html.clone()),
                ),
        )?;

    mailer.transport.send(email).await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_order_confirmation_renders() {
        let lines = [
            EmailLine {
                name: "Chef's Knife",
                sku: "KN-8",
                quantity: 1,
                line_total: dec("89.00"),
            },
            EmailLine {
                name: "Cutting Board",
                sku: "CB-2",
                quantity: 2,
                line_total: dec("40.00"),
            },
        ];
        let html = OrderConfirmationHtml {
            customer_name: "Ada Lovelace",
            order_number: "ORD-20260301-ABC234",
            items: &lines,
            currency: "$",
            subtotal: dec("129.00"),
            has_discount: true,
            discount: dec("12.90"),
            shipping: dec("29.90"),
            total: dec("146.00"),
            address_name: "Ada Lovelace",
            address_line: "12 St James's Square",
            address_city: "SW1Y 4JH London, GB",
        }
        .render()
        .unwrap();
        assert!(html.contains("ORD-20260301-ABC234"));
        // HTML output is escaped.
        assert!(html.contains("Chef&#39;s Knife") || html.contains("Chef&#x27;s Knife"));
        assert!(html.contains("-$12.90"));

        let text = OrderConfirmationText {
            customer_name: "Ada Lovelace",
            order_number: "ORD-20260301-ABC234",
            items: &lines,
            currency: "$",
            subtotal: dec("129.00"),
            has_discount: false,
            discount: Decimal::ZERO,
            shipping: dec("29.90"),
            total: dec("158.90"),
            address_name: "Ada Lovelace",
            address_line: "12 St James's Square",
            address_city: "SW1Y 4JH London, GB",
        }
        .render()
        .unwrap();
        assert!(text.contains("Chef's Knife (KN-8) x 1: $89.00"));
        assert!(text.contains("Total:    $158.90"));
        assert!(!text.contains("Discount"));
    }

    #[test]
    fn test_order_status_renders() {
        let text = OrderStatusText {
            customer_name: "Ada",
            order_number: "ORD-1",
            previous_status: "confirmed",
            status: "cancelled",
        }
        .render()
        .unwrap();
        assert!(text.contains("from confirmed to cancelled"));
        assert!(text.contains("refund"));
    }

    #[test]
    fn test_shipment_update_optional_location() {
        let with = ShipmentUpdateText {
            customer_name: "Ada",
            order_number: "ORD-1",
            status: "in_transit",
            carrier: "UPS",
            tracking_number: "UPS0123456789",
            location: Some("Leipzig hub"),
            description: "Departed facility",
        }
        .render()
        .unwrap();
        assert!(with.contains("Leipzig hub"));

        let without = ShipmentUpdateText {
            customer_name: "Ada",
            order_number: "ORD-1",
            status: "in_transit",
            carrier: "UPS",
            tracking_number: "UPS0123456789",
            location: None,
            description: "Departed facility",
        }
        .render()
        .unwrap();
        assert!(!without.contains("Location"));
    }

    #[test]
    fn test_disabled_service() {
        let service = EmailService::new(None, CurrencyCode::USD).unwrap();
        assert!(!service.is_enabled());
    }
}
