use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::agents::AgentPipeline;
use crate::handlers;
use crate::turn::SessionCoordinator;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<SessionCoordinator>,
    pub pipeline: Arc<dyn AgentPipeline>,
    pub keep_alive_interval_seconds: u64,
}

// ============================================================================
// Server Setup
// ============================================================================

pub fn build_app(state: AppState, request_timeout_seconds: u64, max_connections: usize) -> Router {
    // Streaming route - no request timeout (keepalives handle idle proxies)
    let streaming_routes = Router::new()
        .route("/chat/stream", post(handlers::chat_stream))
        .layer(DefaultBodyLimit::max(256 * 1024)) // 256 KB
        .layer(ConcurrencyLimitLayer::new(max_connections))
        .with_state(state);

    // Plain routes - with request timeout
    let plain_routes = Router::new()
        .route("/livez", get(handlers::livez))
        .route("/readyz", get(handlers::readyz))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_seconds),
        ));

    Router::new().merge(streaming_routes).merge(plain_routes)
}
