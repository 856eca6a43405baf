//! Administrative control surface.
//!
//! All routes require `Authorization: Bearer <admin.api_key>` and sit behind
//! the `admin` admission policy like any other `/admin` path.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;
use crate::http::websocket::alerts_ws;

pub fn setup_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/security/overview", get(get_overview))
        .route("/admin/security/logs", get(get_logs))
        .route("/admin/security/threats", get(get_threats))
        .route("/admin/security/block-ip", post(block_ip))
        .route("/admin/security/unblock-ip", post(unblock_ip))
        .route("/admin/security/unblock-rate-limit", post(unblock_rate_limit))
        .route("/admin/security/alerts", get(alerts_ws))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .with_state(state)
}
