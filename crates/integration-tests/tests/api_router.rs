//! Router-level checks that never reach the database.

use axum::http::{Method, StatusCode};
use serde_json::json;

use emporium_core::UserRole;
use emporium_integration_tests::TestContext;

// =============================================================================
// Health and middleware
// =============================================================================

#[tokio::test]
async fn test_health_is_ok() {
    let ctx = TestContext::new();
    let res = ctx.send(Method::GET, "/health", None, None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.text, "ok");
}

#[tokio::test]
async fn test_readiness_reports_unreachable_database() {
    let ctx = TestContext::new();
    let res = ctx.send(Method::GET, "/health/ready", None, None).await;
    assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_responses_carry_request_id_and_security_headers() {
    let ctx = TestContext::new();
    let res = ctx.send(Method::GET, "/health", None, None).await;
    assert!(res.headers.contains_key("x-request-id"));
    assert_eq!(res.headers["x-frame-options"], "DENY");
    assert_eq!(res.headers["x-content-type-options"], "nosniff");
}

// =============================================================================
// Authentication and authorization
// =============================================================================

#[tokio::test]
async fn test_protected_route_requires_token() {
    let ctx = TestContext::new();
    let res = ctx.send(Method::GET, "/api/cart", None, None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["code"], "UNAUTHORIZED");
    assert_eq!(res.body["status"], 401);
}

#[tokio::test]
async fn test_tampered_token_is_rejected() {
    let ctx = TestContext::new();
    let mut token = ctx.token_for(UserRole::Customer);
    token.push('x');
    let res = ctx.send(Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_customer_is_forbidden_on_admin_routes() {
    let ctx = TestContext::new();
    let token = ctx.token_for(UserRole::Customer);

    for (method, uri) in [
        (Method::GET, "/api/admin/orders"),
        (Method::GET, "/api/admin/inventory/low-stock"),
        (Method::POST, "/api/admin/wishlists/check-prices"),
        (Method::POST, "/api/admin/emails/retry"),
        (Method::GET, "/api/coupons"),
    ] {
        let res = ctx.send(method.clone(), uri, Some(&token), None).await;
        assert_eq!(res.status, StatusCode::FORBIDDEN, "{method} {uri}");
        assert_eq!(res.body["code"], "FORBIDDEN");
    }
}

#[tokio::test]
async fn test_admin_create_requires_admin_before_body_is_used() {
    let ctx = TestContext::new();
    let token = ctx.token_for(UserRole::Customer);
    let res = ctx
        .send(
            Method::POST,
            "/api/categories",
            Some(&token),
            Some(json!({ "name": "Coffee" })),
        )
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
}

// =============================================================================
// Validation before persistence
// =============================================================================

#[tokio::test]
async fn test_register_rejects_invalid_email() {
    let ctx = TestContext::new();
    let res = ctx
        .send(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "email": "not-an-email",
                "password": "correct horse battery",
                "first_name": "Ada",
                "last_name": "Lovelace",
            })),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_register_rejects_short_password() {
    let ctx = TestContext::new();
    let res = ctx
        .send(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "email": "ada@example.com",
                "password": "short",
                "first_name": "Ada",
                "last_name": "Lovelace",
            })),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_search_rejects_inverted_price_range() {
    let ctx = TestContext::new();
    let res = ctx
        .send(Method::GET, "/api/search?min_price=50&max_price=10", None, None)
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let ctx = TestContext::new();
    let res = ctx.send(Method::GET, "/api/does-not-exist", None, None).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}
