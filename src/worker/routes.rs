//! Liveness endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use super::health::WorkerHealth;

/// GET /health
///
/// 200 once models are loaded and the queue is connected, 503 before that.
/// The body is the same in both cases.
async fn get_health(State(health): State<Arc<WorkerHealth>>) -> impl IntoResponse {
    let code = if health.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(health.snapshot()))
}

/// Build the health routes.
pub fn health_routes(health: Arc<WorkerHealth>) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .layer(TraceLayer::new_for_http())
        .with_state(health)
}
