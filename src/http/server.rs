//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the application and admin routes
//! - Wire up middleware (tracing, request ID, timeout, inspection, admission)
//! - Bind the server to a listener and shut down gracefully

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Request,
    http::{Method, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::setup_admin_router;
use crate::audit::{AlertHub, AuditDispatcher, MemorySink};
use crate::config::GuardConfig;
use crate::lifecycle::GuardServices;
use crate::security::middleware::{admission_middleware, inspection_middleware};
use crate::security::policies::HEALTH_PATH;
use crate::security::{AdmissionPolicies, AnomalyInspector};

/// Application state injected into admin handlers.
#[derive(Clone)]
pub struct AppState {
    pub policies: Arc<AdmissionPolicies>,
    pub inspector: Arc<AnomalyInspector>,
    pub audit: AuditDispatcher,
    pub audit_log: Arc<MemorySink>,
    pub alerts: Arc<AlertHub>,
    pub config: Arc<GuardConfig>,
}

impl AppState {
    pub fn new(config: &GuardConfig, services: &GuardServices) -> Self {
        Self {
            policies: services.policies.clone(),
            inspector: services.inspector.clone(),
            audit: services.audit.clone(),
            audit_log: services.audit_log.clone(),
            alerts: services.alerts.clone(),
            config: Arc::new(config.clone()),
        }
    }
}

/// Request-dispatch layer in front of the application routes.
pub struct GuardServer {
    router: Router,
}

impl GuardServer {
    pub fn new(config: &GuardConfig, services: &GuardServices) -> Self {
        let state = AppState::new(config, services);
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// The fully layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Layers wrap inside-out: inspection runs before admission, and both
    /// see the request ID and run under the timeout.
    #[allow(deprecated)]
    fn build_router(config: &GuardConfig, state: AppState) -> Router {
        let mut app = Router::new()
            .route(HEALTH_PATH, get(health))
            .route("/api/v1/{*path}", any(application_handler));

        if config.admin.enabled {
            app = app.merge(setup_admin_router(state.clone()));
        }

        app.layer(middleware::from_fn_with_state(
            state.policies.clone(),
            admission_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.inspector.clone(),
            inspection_middleware,
        ))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.timeouts.request_secs,
        )))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
    }

    /// Serve until `shutdown` resolves, then finish in-flight requests.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Stand-in for the protected application: acknowledges admitted requests.
async fn application_handler(method: Method, request: Request) -> impl IntoResponse {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %request.uri().path(),
        "Request admitted"
    );

    (
        StatusCode::OK,
        Json(json!({
            "status": "admitted",
            "method": method.as_str(),
            "path": request.uri().path(),
            "requestId": request_id,
        })),
    )
}
