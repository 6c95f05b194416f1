//! API configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `API_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `API_TOKEN_SECRET` - Bearer token signing secret (min 32 chars, high entropy)
//!
//! ## Optional
//! - `API_HOST` - Bind address (default: 127.0.0.1)
//! - `API_PORT` - Listen port (default: 3000)
//! - `API_TOKEN_TTL_HOURS` - Token lifetime (default: 24)
//! - `API_CACHE_TTL_SECS` - Catalog cache TTL (default: 300)
//! - `API_CURRENCY` - Store currency (default: USD)
//! - `SHIPPING_FLAT_RATE` - Shipping cost below the free threshold (default: 29.90)
//! - `SHIPPING_FREE_THRESHOLD` - Order amount that ships free (default: 500.00)
//! - `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD`, `EMAIL_FROM` -
//!   Outgoing email (all of host, username, password and from must be set)
//! - `PAYMENT_GATEWAY_URL`, `PAYMENT_GATEWAY_API_KEY` - HTTP payment gateway
//!   (sandbox gateway is used when unset)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use emporium_core::CurrencyCode;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const MIN_TOKEN_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// API application configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Bearer token settings
    pub token: TokenConfig,
    /// TTL for cached catalog reads
    pub cache_ttl: Duration,
    /// Store currency
    pub currency: CurrencyCode,
    /// Shipping pricing
    pub shipping: ShippingConfig,
    /// Outgoing email (None disables email)
    pub email: Option<EmailConfig>,
    /// HTTP payment gateway (None selects the sandbox gateway)
    pub payment_gateway: Option<PaymentGatewayConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Bearer token configuration.
#[derive(Clone)]
pub struct TokenConfig {
    /// HMAC signing secret
    pub secret: SecretString,
    /// Token lifetime in hours
    pub ttl_hours: i64,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"[REDACTED]")
            .field("ttl_hours", &self.ttl_hours)
            .finish()
    }
}

/// Shipping cost rules.
#[derive(Debug, Clone, Copy)]
pub struct ShippingConfig {
    /// Charged when the discounted subtotal is below `free_threshold`
    pub flat_rate: Decimal,
    /// Discounted subtotal at or above which shipping is free
    pub free_threshold: Decimal,
}

impl Default for ShippingConfig {
    fn default() -> Self {
        Self {
            flat_rate: Decimal::new(2990, 2),
            free_threshold: Decimal::new(50_000, 2),
        }
    }
}

/// SMTP configuration.
#[derive(Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: SecretString,
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

/// HTTP payment gateway configuration.
#[derive(Clone)]
pub struct PaymentGatewayConfig {
    /// Base URL; charges are POSTed to `{url}/charges`
    pub url: Url,
    /// API key sent as a bearer token
    pub api_key: SecretString,
}

impl std::fmt::Debug for PaymentGatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentGatewayConfig")
            .field("url", &self.url.as_str())
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("API_DATABASE_URL")?;
        let host = get_parsed_or_default::<IpAddr>("API_HOST", "127.0.0.1")?;
        let port = get_parsed_or_default::<u16>("API_PORT", "3000")?;

        let secret = get_validated_secret("API_TOKEN_SECRET")?;
        validate_token_secret(&secret, "API_TOKEN_SECRET")?;
        let ttl_hours = get_parsed_or_default::<i64>("API_TOKEN_TTL_HOURS", "24")?;
        if ttl_hours <= 0 {
            return Err(ConfigError::InvalidEnvVar(
                "API_TOKEN_TTL_HOURS".to_string(),
                "must be positive".to_string(),
            ));
        }

        let cache_ttl =
            Duration::from_secs(get_parsed_or_default::<u64>("API_CACHE_TTL_SECS", "300")?);
        let currency = get_parsed_or_default::<CurrencyCode>("API_CURRENCY", "USD")?;
        let shipping = ShippingConfig {
            flat_rate: get_parsed_or_default::<Decimal>("SHIPPING_FLAT_RATE", "29.90")?,
            free_threshold: get_parsed_or_default::<Decimal>("SHIPPING_FREE_THRESHOLD", "500.00")?,
        };

        Ok(Self {
            database_url,
            host,
            port,
            token: TokenConfig { secret, ttl_hours },
            cache_ttl,
            currency,
            shipping,
            email: EmailConfig::from_env()?,
            payment_gateway: PaymentGatewayConfig::from_env()?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl EmailConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(smtp_host) = get_optional_env("SMTP_HOST") else {
            return Ok(None);
        };

        Ok(Some(Self {
            smtp_host,
            smtp_port: get_parsed_or_default::<u16>("SMTP_PORT", "587")?,
            smtp_username: get_required_env("SMTP_USERNAME")?,
            smtp_password: get_required_secret("SMTP_PASSWORD")?,
            from_address: get_required_env("EMAIL_FROM")?,
        }))
    }
}

impl PaymentGatewayConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(raw_url) = get_optional_env("PAYMENT_GATEWAY_URL") else {
            return Ok(None);
        };

        let url = Url::parse(&raw_url).map_err(|e| {
            ConfigError::InvalidEnvVar("PAYMENT_GATEWAY_URL".to_string(), e.to_string())
        })?;

        Ok(Some(Self {
            url,
            api_key: get_validated_secret("PAYMENT_GATEWAY_API_KEY")?,
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value and parse it.
fn get_parsed_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    parse_value(key, &raw)
}

/// Parse a raw value, naming the variable on failure.
fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Validate that a token secret meets minimum length requirements.
fn validate_token_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_TOKEN_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_TOKEN_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_bounds() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("ab") - 1.0).abs() < 0.01);
        assert!(shannon_entropy("aB3$xY9!mK2@nL5#") > 3.3);
    }

    #[test]
    fn test_validate_secret_strength_rejects_placeholders() {
        for candidate in ["your-token-here", "changeme123", "my-secret-value"] {
            let err = validate_secret_strength(candidate, "TEST_VAR").unwrap_err();
            assert!(matches!(err, ConfigError::InsecureSecret(_, _)), "{candidate}");
        }
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength(&"ab".repeat(20), "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        assert!(validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR").is_ok());
    }

    #[test]
    fn test_validate_token_secret_length() {
        assert!(validate_token_secret(&SecretString::from("short"), "T").is_err());
        assert!(validate_token_secret(&SecretString::from("k".repeat(32)), "T").is_ok());
    }

    #[test]
    fn test_parse_value_names_the_variable() {
        let err = parse_value::<u16>("API_PORT", "seventy").unwrap_err();
        match err {
            ConfigError::InvalidEnvVar(key, _) => assert_eq!(key, "API_PORT"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(parse_value::<Decimal>("X", " 29.90 ").unwrap(), Decimal::new(2990, 2));
    }

    #[test]
    fn test_shipping_defaults() {
        let shipping = ShippingConfig::default();
        assert_eq!(shipping.flat_rate, Decimal::new(2990, 2));
        assert_eq!(shipping.free_threshold, Decimal::from(500));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let email = EmailConfig {
            smtp_host: "smtp.mail.test".to_string(),
            smtp_port: 587,
            smtp_username: "mailer".to_string(),
            smtp_password: SecretString::from("hunter2-smtp"),
            from_address: "shop@mail.test".to_string(),
        };
        let gateway = PaymentGatewayConfig {
            url: Url::parse("https://pay.test").unwrap(),
            api_key: SecretString::from("sk_live_abcdef"),
        };
        let token = TokenConfig {
            secret: SecretString::from("q".repeat(40)),
            ttl_hours: 24,
        };

        let output = format!("{email:?} {gateway:?} {token:?}");
        assert!(output.contains("smtp.mail.test"));
        assert!(output.contains("[REDACTED]"));
        assert!(!output.contains("hunter2-smtp"));
        assert!(!output.contains("sk_live_abcdef"));
        assert!(!output.contains(&"q".repeat(40)));
    }
}
