//! Request metadata captured for admission decisions.
//!
//! # Responsibilities
//! - Resolve the client address and admission identity
//! - Extract the fields the inspector reads (user agent, declared size,
//!   decoded query, normalized body)
//! - Buffer the body once and hand an equivalent request downstream
//!
//! # Design Decisions
//! - Query parameters are percent-decoded before inspection
//! - JSON bodies are re-serialized so escaped payloads are inspected decoded
//! - A missing connect info (in-process tests) maps to the unspecified address

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, Query};
use axum::http::{header, Request};

use crate::security::identity::{AuthenticatedUser, Identity};

/// Everything the guard needs to know about one inbound request.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    pub identity: Identity,
    pub ip: IpAddr,
    pub method: String,
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub user_agent: Option<String>,
    pub content_length: Option<u64>,
    pub body: Option<String>,
}

impl RequestSnapshot {
    pub fn new(ip: IpAddr, method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            identity: Identity::resolve(None, ip),
            ip,
            method: method.into(),
            path: path.into(),
            query: BTreeMap::new(),
            user_agent: None,
            content_length: None,
            body: None,
        }
    }

    /// Capture headers, extensions and URI. The body is not read.
    pub fn from_request<B>(request: &Request<B>) -> Self {
        let ip = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let user = request.extensions().get::<AuthenticatedUser>();
        let headers = request.headers();

        let query = match Query::<BTreeMap<String, String>>::try_from_uri(request.uri()) {
            Ok(Query(query)) => query,
            // Undecodable query strings are still inspected, verbatim.
            Err(_) => request
                .uri()
                .query()
                .map(|raw| BTreeMap::from([(String::new(), raw.to_string())]))
                .unwrap_or_default(),
        };

        Self {
            identity: Identity::resolve(user, ip),
            ip,
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
            query,
            user_agent: headers
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            content_length: headers
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok()),
            body: None,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_content_length(mut self, length: u64) -> Self {
        self.content_length = Some(length);
        self
    }

    pub fn with_body(mut self, bytes: &[u8]) -> Self {
        self.body = Some(normalize_body(bytes));
        self
    }

    /// Path, serialized query and body concatenated into one string.
    pub fn inspectable_content(&self) -> String {
        let mut content = self.path.clone();
        if !self.query.is_empty() {
            if let Ok(query) = serde_json::to_string(&self.query) {
                content.push_str(&query);
            }
        }
        if let Some(body) = &self.body {
            content.push_str(body);
        }
        content
    }

    /// True for 127.0.0.0/8, ::1 and their IPv4-mapped forms.
    pub fn is_loopback(&self) -> bool {
        self.ip.to_canonical().is_loopback()
    }
}

fn normalize_body(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }
    match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(value) => value.to_string(),
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Read the body (up to `limit` bytes) and rebuild an equivalent request.
pub async fn buffer_body(
    request: Request<Body>,
    limit: usize,
) -> Result<(Request<Body>, Bytes), axum::Error> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, limit).await?;
    Ok((Request::from_parts(parts, Body::from(bytes.clone())), bytes))
}
