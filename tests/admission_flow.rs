//! Admission behavior through the full router.

use std::time::Duration;

use axum::http::StatusCode;

use admission_guard::config::PolicyConfig;
use admission_guard::security::{AuthenticatedUser, PolicyName};

mod common;
use common::*;

fn remaining(response: &axum::response::Response) -> u32 {
    response.headers()["x-ratelimit-remaining"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap()
}

#[tokio::test]
async fn test_three_requests_then_velocity_reject() {
    let guard = TestGuard::start(test_config()).await;

    let mut seen = Vec::new();
    for _ in 0..3 {
        let response = guard.send(get("/api/v1/users", "1.2.3.4")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "3");
        assert!(response.headers().contains_key("x-ratelimit-reset"));
        seen.push(remaining(&response));
    }
    assert_eq!(seen, vec![2, 1, 0]);

    guard.clock.advance(Duration::from_secs(1));
    let response = guard.send(get("/api/v1/users", "1.2.3.4")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["retry-after"], "59");

    let body = body_json(response).await;
    assert_eq!(body["error"], "Too many API requests");
    assert_eq!(body["retryAfter"], 59);
    assert_eq!(body["limit"], 3);
    assert_eq!(body["windowMs"], 60_000);

    guard.stop().await;
}

#[tokio::test]
async fn test_window_rollover_readmits() {
    let guard = TestGuard::start(test_config()).await;

    for _ in 0..4 {
        guard.send(get("/api/v1/users", "1.2.3.4")).await;
    }
    guard.clock.advance(Duration::from_millis(60_001));

    let response = guard.send(get("/api/v1/users", "1.2.3.4")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(remaining(&response), 2);

    let record = guard
        .services
        .policies
        .get(PolicyName::Api)
        .record("ip:1.2.3.4")
        .unwrap();
    assert_eq!(record.count, 1);
    assert_eq!(record.suspicion_score, 0);

    guard.stop().await;
}

#[tokio::test]
async fn test_escalation_blocks_until_admin_unblock() {
    let mut config = test_config();
    config.policies.api = PolicyConfig::new(60_000, 1, "Too many API requests");
    let guard = TestGuard::start(config).await;

    assert_eq!(
        guard.send(get("/api/v1/users", "9.9.9.9")).await.status(),
        StatusCode::OK
    );
    for _ in 0..5 {
        let response = guard.send(get("/api/v1/users", "9.9.9.9")).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    // Sticky across window rollovers.
    guard.clock.advance(Duration::from_secs(120));
    let response = guard.send(get("/api/v1/users", "9.9.9.9")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(response).await;
    assert_eq!(
        body["error"],
        "Access temporarily blocked due to suspicious activity"
    );
    assert!(body["retryAfter"].as_u64().unwrap() > 0);

    let response = guard
        .send(admin_post(
            "/admin/security/unblock-rate-limit",
            r#"{"identifier":"ip:9.9.9.9","type":"api"}"#,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["success"], true);

    guard.clock.advance(Duration::from_secs(61));
    let response = guard.send(get("/api/v1/users", "9.9.9.9")).await;
    assert_eq!(response.status(), StatusCode::OK);

    guard.stop().await;
}

#[tokio::test]
async fn test_unblock_unknown_identifier_is_not_found() {
    let guard = TestGuard::start(test_config()).await;

    let response = guard
        .send(admin_post(
            "/admin/security/unblock-rate-limit",
            r#"{"identifier":"ip:8.8.8.8"}"#,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = guard
        .send(admin_post(
            "/admin/security/unblock-rate-limit",
            r#"{"identifier":"ip:8.8.8.8","type":"general"}"#,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = guard
        .send(admin_post("/admin/security/unblock-rate-limit", r#"{}"#))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    guard.stop().await;
}

#[tokio::test]
async fn test_authenticated_users_have_their_own_budget() {
    let guard = TestGuard::start(test_config()).await;

    for user in ["alice", "bob"] {
        for expected in [2, 1, 0] {
            let request = client_request("GET", "/api/v1/users", "1.2.3.4")
                .extension(AuthenticatedUser::new(user))
                .body(axum::body::Body::empty())
                .unwrap();
            let response = guard.send(request).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(remaining(&response), expected);
        }
    }

    // The shared address itself is still untouched.
    let response = guard.send(get("/api/v1/users", "1.2.3.4")).await;
    assert_eq!(remaining(&response), 2);

    guard.stop().await;
}

#[tokio::test]
async fn test_policies_hold_independent_budgets() {
    let mut config = test_config();
    config.policies.chat = PolicyConfig::new(60_000, 1, "Too many chat messages");
    let guard = TestGuard::start(config).await;

    let chat = r#"{"text":"hello"}"#;
    assert_eq!(
        guard
            .send(post_json("/api/v1/chat/send", "5.5.5.5", chat))
            .await
            .status(),
        StatusCode::OK
    );
    let response = guard
        .send(post_json("/api/v1/chat/send", "5.5.5.5", chat))
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json(response).await["error"], "Too many chat messages");

    let response = guard.send(get("/api/v1/users", "5.5.5.5")).await;
    assert_eq!(response.status(), StatusCode::OK);

    guard.stop().await;
}

#[tokio::test]
async fn test_mapped_ipv6_peer_shares_ipv4_budget() {
    let guard = TestGuard::start(test_config()).await;

    let response = guard.send(get("/api/v1/users", "1.2.3.4")).await;
    assert_eq!(remaining(&response), 2);
    let response = guard.send(get("/api/v1/users", "::ffff:1.2.3.4")).await;
    assert_eq!(remaining(&response), 1);
    let response = guard.send(get("/api/v1/users", "1.2.3.4")).await;
    assert_eq!(remaining(&response), 0);

    let response = guard.send(get("/api/v1/users", "::ffff:1.2.3.4")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    guard.stop().await;
}

#[tokio::test]
async fn test_health_is_exempt() {
    let guard = TestGuard::start(test_config()).await;

    for _ in 0..10 {
        let request = axum::http::Request::builder()
            .uri("/health")
            .body(axum::body::Body::empty())
            .unwrap();
        let response = guard.send(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key("x-ratelimit-limit"));
    }

    guard.stop().await;
}

#[tokio::test]
async fn test_admin_requires_key() {
    let guard = TestGuard::start(test_config()).await;

    let response = guard
        .send(get("/admin/security/overview", ADMIN_IP))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = guard.send(admin_get("/admin/security/overview")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["rateLimits"]["api"].is_object());
    assert_eq!(body["inspector"]["suspiciousPatterns"], 6);

    guard.stop().await;
}
