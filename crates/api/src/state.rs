//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::ApiConfig;
use crate::models::order::ShippingRule;
use crate::services::auth::TokenSigner;
use crate::services::cache::CacheService;
use crate::services::email::{EmailError, EmailService};
use crate::services::payment::{GatewayError, HttpPaymentGateway, PaymentGateway, SandboxGateway};

/// Error building the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("email transport: {0}")]
    Email(#[from] EmailError),
    #[error("payment gateway: {0}")]
    Gateway(#[from] GatewayError),
    #[error("token TTL of {0} hours is out of range")]
    TokenTtl(i64),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ApiConfig,
    pool: PgPool,
    cache: CacheService,
    tokens: TokenSigner,
    email: EmailService,
    gateway: Arc<dyn PaymentGateway>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Uses the HTTP payment gateway when one is configured and the sandbox
    /// gateway otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the SMTP transport or gateway client cannot be
    /// built.
    pub fn new(config: ApiConfig, pool: PgPool) -> Result<Self, StateError> {
        let gateway: Arc<dyn PaymentGateway> = match &config.payment_gateway {
            Some(gateway) => Arc::new(HttpPaymentGateway::new(gateway)?),
            None => {
                tracing::info!("No payment gateway configured; using sandbox gateway");
                Arc::new(SandboxGateway)
            }
        };
        Self::with_gateway(config, pool, gateway)
    }

    /// Create a new application state around an explicit gateway.
    ///
    /// # Errors
    ///
    /// Returns an error if the SMTP transport cannot be built.
    pub fn with_gateway(
        config: ApiConfig,
        pool: PgPool,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Result<Self, StateError> {
        let ttl = chrono::Duration::try_hours(config.token.ttl_hours)
            .ok_or(StateError::TokenTtl(config.token.ttl_hours))?;
        let tokens = TokenSigner::new(config.token.secret.clone(), ttl);
        let cache = CacheService::new(config.cache_ttl);
        let email = EmailService::new(config.email.as_ref(), config.currency)?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                cache,
                tokens,
                email,
                gateway,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    #[must_use]
    pub fn cache(&self) -> &CacheService {
        &self.inner.cache
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenSigner {
        &self.inner.tokens
    }

    #[must_use]
    pub fn email(&self) -> &EmailService {
        &self.inner.email
    }

    #[must_use]
    pub fn gateway(&self) -> &dyn PaymentGateway {
        self.inner.gateway.as_ref()
    }

    /// Shipping pricing from configuration.
    #[must_use]
    pub fn shipping_rule(&self) -> ShippingRule {
        let shipping = self.inner.config.shipping;
        ShippingRule {
            flat_rate: shipping.flat_rate,
            free_threshold: shipping.free_threshold,
        }
    }
}
