//! Payment gateway clients.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use emporium_core::{OrderId, PaymentMethod, round_money};

use crate::config::PaymentGatewayConfig;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid gateway configuration: {0}")]
    Config(String),
}

/// A charge to submit.
#[derive(Debug, Clone, Serialize)]
pub struct ChargeRequest<'a> {
    pub order_id: OrderId,
    pub order_number: &'a str,
    pub amount: Decimal,
    pub currency: &'static str,
    pub method: PaymentMethod,
}

/// Gateway answer to a charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    Approved { reference: String },
    Declined { reason: String },
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Submit a charge.
    ///
    /// A decline is an `Ok` outcome; errors mean the gateway could not answer.
    async fn charge(&self, request: &ChargeRequest<'_>) -> Result<ChargeOutcome, GatewayError>;

    /// Refund part of a settled charge, returning the refund reference.
    async fn refund(&self, reference: &str, amount: Decimal) -> Result<String, GatewayError>;
}

/// In-process gateway for development and tests.
///
/// Approves everything except amounts ending in `.13`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SandboxGateway;

impl SandboxGateway {
    #[must_use]
    pub fn declines(amount: Decimal) -> bool {
        let cents = (round_money(amount) * Decimal::ONE_HUNDRED) % Decimal::ONE_HUNDRED;
        cents == Decimal::from(13)
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn charge(&self, request: &ChargeRequest<'_>) -> Result<ChargeOutcome, GatewayError> {
        if Self::declines(request.amount) {
            return Ok(ChargeOutcome::Declined {
                reason: "card declined by sandbox".to_string(),
            });
        }
        Ok(ChargeOutcome::Approved {
            reference: format!("sbx_{}", Uuid::new_v4().simple()),
        })
    }

    async fn refund(&self, _reference: &str, _amount: Decimal) -> Result<String, GatewayError> {
        Ok(format!("sbx_re_{}", Uuid::new_v4().simple()))
    }
}

#[derive(Debug, Deserialize)]
struct ChargeResponse {
    status: String,
    reference: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct RefundBody<'a> {
    charge: &'a str,
    amount: Decimal,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    reference: String,
}

/// JSON gateway over HTTP with a bearer API key.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpPaymentGateway {
    /// # Errors
    ///
    /// Returns `GatewayError::Config` for an unusable API key and
    /// `GatewayError::Http` if the client fails to build.
    pub fn new(config: &PaymentGatewayConfig) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", config.api_key.expose_secret());
        let mut auth = HeaderValue::from_str(&auth_value)
            .map_err(|e| GatewayError::Config(format!("invalid API key: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.as_str().trim_end_matches('/'))
    }

    async fn api_error(response: reqwest::Response) -> GatewayError {
        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        GatewayError::Api { status, message }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn charge(&self, request: &ChargeRequest<'_>) -> Result<ChargeOutcome, GatewayError> {
        let response = self
            .client
            .post(self.endpoint("charges"))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        // 402 carries a decline body.
        if !status.is_success() && status != reqwest::StatusCode::PAYMENT_REQUIRED {
            return Err(Self::api_error(response).await);
        }

        let body: ChargeResponse = response.json().await?;
        outcome_from(body)
    }

    async fn refund(&self, reference: &str, amount: Decimal) -> Result<String, GatewayError> {
        let response = self
            .client
            .post(self.endpoint("refunds"))
            .json(&RefundBody {
                charge: reference,
                amount,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        let body: RefundResponse = response.json().await?;
        Ok(body.reference)
    }
}

fn outcome_from(body: ChargeResponse) -> Result<ChargeOutcome, GatewayError> {
    match (body.status.as_str(), body.reference) {
        ("approved" | "succeeded", Some(reference)) => Ok(ChargeOutcome::Approved { reference }),
        ("declined" | "failed", _) => Ok(ChargeOutcome::Declined {
            reason: body.reason.unwrap_or_else(|| "declined".to_string()),
        }),
        (status, _) => Err(GatewayError::Api {
            status: 200,
            message: format!("unexpected charge status {status:?}"),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_sandbox_declines_thirteen_cents() {
        assert!(SandboxGateway::declines(dec("10.13")));
        assert!(SandboxGateway::declines(dec("0.13")));
        assert!(!SandboxGateway::declines(dec("10.12")));
        assert!(!SandboxGateway::declines(dec("13.00")));
    }

    #[tokio::test]
    async fn test_sandbox_charge() {
        let request = ChargeRequest {
            order_id: OrderId::generate(),
            order_number: "ORD-20260101-AAAAAA",
            amount: dec("42.00"),
            currency: "USD",
            method: PaymentMethod::CreditCard,
        };
        let outcome = SandboxGateway.charge(&request).await.unwrap();
        assert!(matches!(outcome, ChargeOutcome::Approved { reference } if reference.starts_with("sbx_")));

        let declined = ChargeRequest {
            amount: dec("42.13"),
            ..request
        };
        assert!(matches!(
            SandboxGateway.charge(&declined).await.unwrap(),
            ChargeOutcome::Declined { .. }
        ));
    }

    #[test]
    fn test_outcome_from_response() {
        let approved = ChargeResponse {
            status: "approved".to_string(),
            reference: Some("ch_1".to_string()),
            reason: None,
        };
        assert_eq!(
            outcome_from(approved).unwrap(),
            ChargeOutcome::Approved {
                reference: "ch_1".to_string()
            }
        );

        let declined = ChargeResponse {
            status: "declined".to_string(),
            reference: None,
            reason: Some("insufficient funds".to_string()),
        };
        assert_eq!(
            outcome_from(declined).unwrap(),
            ChargeOutcome::Declined {
                reason: "insufficient funds".to_string()
            }
        );

        let odd = ChargeResponse {
            status: "approved".to_string(),
            reference: None,
            reason: None,
        };
        assert!(outcome_from(odd).is_err());
    }

    #[test]
    fn test_endpoint_joins_paths() {
        let config = PaymentGatewayConfig {
            url: Url::parse("https://pay.test/v1/").unwrap(),
            api_key: secrecy::SecretString::from("sk_test_123"),
        };
        let gateway = HttpPaymentGateway::new(&config).unwrap();
        assert_eq!(gateway.endpoint("charges"), "https://pay.test/v1/charges");
    }
}
