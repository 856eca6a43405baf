//! Rate-limit response headers.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use chrono::{SecondsFormat, Utc};

use crate::security::rate_limit::Allowance;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Attach limit, remaining budget and reset time (RFC 3339) to a response.
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, allowance: &Allowance) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(allowance.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(allowance.remaining));

    let reset_in = chrono::Duration::from_std(allowance.reset_in).unwrap_or_default();
    let reset = (Utc::now() + reset_in).to_rfc3339_opts(SecondsFormat::Millis, true);
    if let Ok(value) = HeaderValue::from_str(&reset) {
        headers.insert(X_RATELIMIT_RESET, value);
    }
}
