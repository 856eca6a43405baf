//! Rejection responses.
//!
//! Velocity and block rejections answer 429 with a retry hint (body and
//! `Retry-After`). Everything else answers 403 with a generic error and the
//! rejection reason only; rule details never leave the process.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;

use crate::error::Rejection;

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::Velocity { .. } | Rejection::IdentityBlocked { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            Rejection::AddressBlocked | Rejection::Content | Rejection::Validation { .. } => {
                StatusCode::FORBIDDEN
            }
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Rejection::Velocity {
                message,
                retry_after_secs,
                limit,
                window_ms,
            } => json!({
                "error": message,
                "retryAfter": retry_after_secs,
                "limit": limit,
                "windowMs": window_ms,
            }),
            Rejection::IdentityBlocked { retry_after_secs } => json!({
                "error": self.to_string(),
                "retryAfter": retry_after_secs,
            }),
            _ => json!({
                "error": "Request blocked for security reasons",
                "reason": self.to_string(),
                "timestamp": Utc::now().to_rfc3339(),
            }),
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = self.retry_after_secs() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_velocity_response() {
        let response = Rejection::Velocity {
            message: "Too many chat messages".into(),
            retry_after_secs: 42,
            limit: 20,
            window_ms: 60_000,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
        let body = body_json(response).await;
        assert_eq!(body["error"], "Too many chat messages");
        assert_eq!(body["retryAfter"], 42);
        assert_eq!(body["limit"], 20);
        assert_eq!(body["windowMs"], 60_000);
    }

    #[tokio::test]
    async fn test_content_response_has_no_retry_hint() {
        let response = Rejection::Content.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());

        let body = body_json(response).await;
        assert_eq!(body["error"], "Request blocked for security reasons");
        assert_eq!(body["reason"], "Suspicious content detected");
        assert!(body.get("retryAfter").is_none());
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_blocked_identity_response() {
        let response = Rejection::IdentityBlocked { retry_after_secs: 7 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = body_json(response).await;
        assert_eq!(body["retryAfter"], 7);
    }
}
