//! Request ID middleware for request tracing and correlation.
//!
//! An `x-request-id` from an upstream proxy is reused when it looks sane;
//! otherwise a UUID v4 is generated. The ID is recorded in the request span,
//! tagged on the Sentry scope, and echoed in the response.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Span;
use uuid::Uuid;

/// The HTTP header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest upstream ID accepted verbatim.
const MAX_UPSTREAM_LEN: usize = 128;

/// Upstream IDs must be short visible ASCII.
fn accept_upstream(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_UPSTREAM_LEN
        && value.bytes().all(|b| b.is_ascii_graphic())
}

pub async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|v| accept_upstream(v))
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    Span::current().record("request_id", request_id.as_str());
    sentry::configure_scope(|scope| {
        scope.set_tag("request_id", &request_id);
    });
    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_upstream() {
        assert!(accept_upstream("cf-7f3a9c"));
        assert!(!accept_upstream(""));
        assert!(!accept_upstream("has space"));
        assert!(!accept_upstream(&"a".repeat(129)));
    }
}
