//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, request::Builder, Request},
    response::Response,
    Router,
};
use tower::ServiceExt;

use admission_guard::audit::MemorySink;
use admission_guard::config::{GuardConfig, PolicyConfig};
use admission_guard::lifecycle::{BackgroundTasks, GuardServices, Shutdown};
use admission_guard::security::ManualClock;
use admission_guard::GuardServer;

pub const BROWSER: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";
pub const ADMIN_KEY: &str = "test-admin-key";
pub const ADMIN_IP: &str = "10.0.0.200";

/// Defaults with the admin surface on and a small api policy.
pub fn test_config() -> GuardConfig {
    let mut config = GuardConfig::default();
    config.admin.enabled = true;
    config.admin.api_key = ADMIN_KEY.to_string();
    config.policies.api = PolicyConfig::new(60_000, 3, "Too many API requests");
    config
}

/// A guard wired in-process with a manual clock and a running audit worker.
pub struct TestGuard {
    pub services: GuardServices,
    pub router: Router,
    pub clock: ManualClock,
    pub shutdown: Shutdown,
    background: Option<BackgroundTasks>,
}

impl TestGuard {
    pub async fn start(config: GuardConfig) -> Self {
        let clock = ManualClock::default();
        let (services, worker) = GuardServices::build(&config, std::sync::Arc::new(clock.clone()))
            .await
            .expect("services build");
        let shutdown = Shutdown::new();
        let background = services.spawn_background(worker, &shutdown);
        let router = GuardServer::new(&config, &services).router();

        Self {
            services,
            router,
            clock,
            shutdown,
            background: Some(background),
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub fn audit_log(&self) -> &MemorySink {
        &self.services.audit_log
    }

    pub async fn stop(mut self) {
        self.shutdown.trigger();
        if let Some(background) = self.background.take() {
            background.join().await;
        }
    }
}

/// Request from `ip` with a browser user agent.
pub fn client_request(method: &str, uri: &str, ip: &str) -> Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::USER_AGENT, BROWSER)
        .extension(ConnectInfo(SocketAddr::new(ip.parse().unwrap(), 40_000)))
}

pub fn get(uri: &str, ip: &str) -> Request<Body> {
    client_request("GET", uri, ip).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, ip: &str, body: &str) -> Request<Body> {
    client_request("POST", uri, ip)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn admin_post(uri: &str, body: &str) -> Request<Body> {
    client_request("POST", uri, ADMIN_IP)
        .header(header::AUTHORIZATION, format!("Bearer {ADMIN_KEY}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn admin_get(uri: &str) -> Request<Body> {
    client_request("GET", uri, ADMIN_IP)
        .header(header::AUTHORIZATION, format!("Bearer {ADMIN_KEY}"))
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Wait until the audit worker has written at least `count` events.
pub async fn wait_for_events(log: &MemorySink, count: usize) {
    for _ in 0..200 {
        if log.len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {count} audit events, found {}", log.len());
}
