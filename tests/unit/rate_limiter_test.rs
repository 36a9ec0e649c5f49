use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware,
    routing::get,
    Router,
};
use neonchat::api::rate_limiter::{rate_limit_middleware, RateLimiter};
use std::net::IpAddr;
use tower::ServiceExt;

#[test]
fn test_rate_limiter_allows_first_request() {
    let limiter = RateLimiter::new(60);
    let ip: IpAddr = "127.0.0.1".parse().unwrap();

    assert!(limiter.check_rate_limit(ip));
}

#[test]
fn test_rate_limiter_blocks_excess_requests() {
    let limiter = RateLimiter::new(2); // Only 2 requests
    let ip: IpAddr = "127.0.0.1".parse().unwrap();

    assert!(limiter.check_rate_limit(ip));
    assert!(limiter.check_rate_limit(ip));

    // Third request should be blocked
    assert!(!limiter.check_rate_limit(ip));
}

#[test]
fn test_rate_limiter_different_ips() {
    let limiter = RateLimiter::new(1); // Only 1 request per IP

    let ip1: IpAddr = "127.0.0.1".parse().unwrap();
    let ip2: IpAddr = "127.0.0.2".parse().unwrap();

    assert!(limiter.check_rate_limit(ip1));
    assert!(limiter.check_rate_limit(ip2)); // Different IP
    assert!(!limiter.check_rate_limit(ip1));
}

#[test]
fn test_rate_limiter_clones_share_state() {
    let limiter = RateLimiter::new(1);
    let clone = limiter.clone();
    let ip: IpAddr = "10.1.2.3".parse().unwrap();

    assert!(limiter.check_rate_limit(ip));
    assert!(!clone.check_rate_limit(ip));
}

#[tokio::test]
async fn test_middleware_returns_429_json() {
    let limiter = RateLimiter::new(1);
    let app = Router::new()
        .route("/ping", get(|| async { "pong" }))
        .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));

    let request = || {
        Request::builder()
            .uri("/ping")
            .header("x-forwarded-for", "192.0.2.10")
            .body(Body::empty())
            .unwrap()
    };

    let response = app.clone().oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.clone().oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["code"], 429);
}
