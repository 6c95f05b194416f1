//! HTTP middleware stack for the API.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors, bind a hub per request)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Security headers (JSON API policy)
//! 5. Rate limiting (governor), per route group
//!
//! Authentication is not a layer: handlers opt in through the
//! [`RequireUser`], [`RequireAdmin`] and [`OptionalUser`] extractors.

pub mod auth;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;

pub use auth::{AuthUser, OptionalUser, RequireAdmin, RequireUser};
pub use rate_limit::{api_rate_limiter, auth_rate_limiter};
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;
