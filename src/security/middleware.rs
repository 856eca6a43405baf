//! Axum middleware for the admission path.
//!
//! Layer order on the router (outermost first): inspection, then admission.
//! Inspection needs the body, so it buffers it once (bounded by the size
//! ceiling) and forwards an equivalent request.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::Rejection;
use crate::http::request::{buffer_body, RequestSnapshot};
use crate::security::headers::apply_rate_limit_headers;
use crate::security::inspector::AnomalyInspector;
use crate::security::policies::{AdmissionPolicies, PolicyName, HEALTH_PATH};
use crate::security::rate_limit::Decision;

pub async fn inspection_middleware(
    State(inspector): State<Arc<AnomalyInspector>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.uri().path() == HEALTH_PATH {
        return next.run(request).await;
    }

    let snapshot = RequestSnapshot::from_request(&request);
    if inspector.bypasses(&snapshot) {
        return next.run(request).await;
    }
    let limit = inspector.max_request_size();

    // Declared oversize requests are refused before any body is read.
    if let Some(length) = snapshot.content_length.filter(|&length| length > limit) {
        return reject(inspector.reject_oversized(&snapshot, length).rejection);
    }

    let body_limit = usize::try_from(limit).unwrap_or(usize::MAX);
    let (request, bytes) = match buffer_body(request, body_limit).await {
        Ok(buffered) => buffered,
        Err(e) => {
            inspector.record_middleware_error(&snapshot, &e.to_string());
            return Rejection::validation("Request body could not be read").into_response();
        }
    };

    let verdict = inspector.check(&snapshot.with_body(&bytes));
    if verdict.allowed {
        next.run(request).await
    } else {
        reject(verdict.rejection)
    }
}

fn reject(rejection: Option<Rejection>) -> Response {
    rejection
        .unwrap_or_else(|| Rejection::validation("Request blocked"))
        .into_response()
}

pub async fn admission_middleware(
    State(policies): State<Arc<AdmissionPolicies>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(policy) = PolicyName::for_path(request.uri().path()) else {
        return next.run(request).await;
    };

    let snapshot = RequestSnapshot::from_request(&request);
    match policies.get(policy).admit(&snapshot) {
        Decision::Allow(allowance) => {
            let mut response = next.run(request).await;
            apply_rate_limit_headers(response.headers_mut(), &allowance);
            response
        }
        Decision::Reject(rejection) => {
            tracing::warn!(
                policy = %policy,
                identity = %snapshot.identity,
                path = %snapshot.path,
                retry_after_secs = rejection.retry_after_secs(),
                "Rate limit exceeded"
            );
            rejection.into_response()
        }
    }
}
