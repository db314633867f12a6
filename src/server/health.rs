//! Liveness endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use tracing::warn;

use super::AppState;

/// `GET /health`
///
/// 200 "OK" while the task queue can be listed, 503 otherwise (for example
/// when the spool directory has vanished).
pub async fn health_handler(State(app_state): State<AppState>) -> (StatusCode, &'static str) {
    match app_state.listener().queue().pending() {
        Ok(_) => (StatusCode::OK, "OK"),
        Err(e) => {
            warn!(error = %e, "Health check failed to read task queue");
            (StatusCode::SERVICE_UNAVAILABLE, "task queue unavailable")
        }
    }
}
