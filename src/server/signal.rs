//! Signal intake endpoint.
//!
//! Accepts a signed [`LifecycleSignal`], verifies it, and queues a
//! reconciliation through the ingress listener before returning 202.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::AppState;
use super::signature::{SIGNATURE_HEADER, verify_signature};
use crate::host::LifecycleSignal;
use crate::queue::{EnqueueOutcome, QueueError};

/// Errors that can occur when accepting a signal.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("missing x-signal-signature header")]
    MissingSignature,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid signal body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("failed to queue reconciliation: {0}")]
    Queue(#[from] QueueError),
}

impl IntoResponse for SignalError {
    fn into_response(self) -> Response {
        let status = match &self {
            SignalError::MissingSignature | SignalError::InvalidSignature => {
                StatusCode::UNAUTHORIZED
            }
            SignalError::InvalidJson(_) => StatusCode::BAD_REQUEST,
            SignalError::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// `POST /signals`
///
/// - 202 Accepted: task queued, or collapsed into an already pending one
/// - 400 Bad Request: body is not a valid signal
/// - 401 Unauthorized: signature missing or wrong
/// - 500 Internal Server Error: the queue could not be written
///
/// ```ignore
/// POST /signals HTTP/1.1
/// X-Signal-Signature: sha256=...
/// Content-Type: application/json
///
/// {"type": "page_moved", "page_id": 7, "new_prefixed_title": "Talk:B"}
///
/// HTTP/1.1 202 Accepted
/// ```
#[instrument(skip_all)]
pub async fn signal_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), SignalError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(SignalError::MissingSignature)?;

    if !verify_signature(&body, signature, app_state.signal_secret()) {
        warn!("Rejected signal with invalid signature");
        return Err(SignalError::InvalidSignature);
    }

    let signal: LifecycleSignal = serde_json::from_slice(&body)?;
    let page = signal.page_id();
    debug!(page = %page, ?signal, "Received signal");

    match app_state.listener().handle(&signal) {
        Ok(EnqueueOutcome::Enqueued) => {
            info!(page = %page, "Signal queued for reconciliation");
            Ok((StatusCode::ACCEPTED, "Accepted"))
        }
        Ok(EnqueueOutcome::AlreadyPending) => Ok((StatusCode::ACCEPTED, "Accepted (pending)")),
        Err(e) => {
            warn!(page = %page, error = %e, "Failed to queue signal");
            Err(SignalError::Queue(e))
        }
    }
}
