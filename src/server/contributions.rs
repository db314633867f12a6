//! Read-only inspection of stored contributions and queued work.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use super::AppState;
use crate::queue::{QuarantinedTask, QueueError};
use crate::store::StoreError;
use crate::types::{ContributionRecord, EventId, PageId, ReconciliationTask};

/// Errors that can occur when reading inspection data.
#[derive(Debug, Error)]
pub enum InspectError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

impl IntoResponse for InspectError {
    fn into_response(self) -> Response {
        let status = match &self {
            InspectError::Store(e) if e.is_retriable() => StatusCode::SERVICE_UNAVAILABLE,
            InspectError::Store(_) | InspectError::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// `GET /api/v1/pages/{page_id}/contributions`
///
/// Returns the page's contributions in revision order; an untracked page
/// yields an empty array.
pub async fn page_contributions_handler(
    State(app_state): State<AppState>,
    Path(page_id): Path<u64>,
) -> Result<Json<Vec<ContributionRecord>>, InspectError> {
    Ok(Json(app_state.store().find_by_page(PageId(page_id))?))
}

/// `GET /api/v1/events/{event_id}/contributions`
pub async fn event_contributions_handler(
    State(app_state): State<AppState>,
    Path(event_id): Path<u64>,
) -> Result<Json<Vec<ContributionRecord>>, InspectError> {
    Ok(Json(app_state.store().find_by_event(EventId(event_id))?))
}

/// Body of `GET /api/v1/tasks`.
#[derive(Debug, Serialize)]
pub struct TaskListing {
    pub pending: Vec<ReconciliationTask>,
    pub quarantined: Vec<QuarantinedTask>,
}

/// `GET /api/v1/tasks`
///
/// Lists pending tasks (oldest first) and quarantined tasks awaiting an
/// operator.
pub async fn tasks_handler(
    State(app_state): State<AppState>,
) -> Result<Json<TaskListing>, InspectError> {
    let queue = app_state.listener().queue();
    Ok(Json(TaskListing {
        pending: queue.pending()?,
        quarantined: queue.quarantined()?,
    }))
}
