//! Development API.
//!
//! A small axum server that plays the remote API for local runs and integration
//! tests: the identity oracle behind a signed session cookie, and one role-scoped
//! listing endpoint per resource kind.

use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
    routing::{get, post},
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

use crate::config::AppConfig;

pub mod auth;
pub mod fixtures;
pub mod handlers;

use fixtures::Directory;

/// DirectoryState
///
/// Shared, read-only account and record directory.
pub type DirectoryState = Arc<Directory>;

/// DevState
///
/// Unified state of the development API.
#[derive(Clone)]
pub struct DevState {
    pub config: AppConfig,
    pub directory: DirectoryState,
}

impl DevState {
    /// State over the seeded directory.
    pub fn seeded(config: AppConfig) -> Self {
        Self {
            config,
            directory: Arc::new(Directory::seeded()),
        }
    }
}

impl FromRef<DevState> for AppConfig {
    fn from_ref(state: &DevState) -> AppConfig {
        state.config.clone()
    }
}

impl FromRef<DevState> for DirectoryState {
    fn from_ref(state: &DevState) -> DirectoryState {
        state.directory.clone()
    }
}

async fn health() -> &'static str {
    "ok"
}

/// create_router
///
/// Assembles the development API and wraps it in the request-id and tracing layers.
pub fn create_router(state: DevState) -> Router {
    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .route("/health", get(health))
        .route("/auth/login", post(handlers::login))
        .route("/auth/logout", post(handlers::logout))
        .route("/auth/me", get(handlers::me))
        .route("/{kind}/{scope}", get(handlers::list_resources))
        .with_state(state);

    base_router.layer(
        ServiceBuilder::new()
            // 1. Request ID Generation
            .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
            // 2. Request Tracing, correlated by the generated id
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(trace_span_logger)
                    .on_response(
                        DefaultOnResponse::new()
                            .level(Level::INFO)
                            .latency_unit(tower_http::LatencyUnit::Millis),
                    ),
            )
            // 3. Request ID Propagation back to the client
            .layer(PropagateRequestIdLayer::new(x_request_id)),
    )
}

/// trace_span_logger
///
/// Span for one request, tagged with its `x-request-id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
