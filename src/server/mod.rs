//! HTTP ingress for the contribution reconciler.
//!
//! # Endpoints
//!
//! - `POST /signals` - Accepts a signed life-cycle signal and queues a reconciliation (202)
//! - `GET /api/v1/pages/{page_id}/contributions` - A page's contributions as JSON
//! - `GET /api/v1/events/{event_id}/contributions` - An event's contributions as JSON
//! - `GET /api/v1/tasks` - Pending and quarantined tasks
//! - `GET /health` - 200 while the task queue is readable

use std::sync::Arc;

pub mod contributions;
pub mod health;
pub mod signal;
pub mod signature;

pub use contributions::{event_contributions_handler, page_contributions_handler, tasks_handler};
pub use health::health_handler;
pub use signal::signal_handler;
pub use signature::{SIGNATURE_HEADER, sign_payload, verify_signature};

use crate::ingress::IngressListener;
use crate::queue::TaskQueue;
use crate::store::ContributionStore;

/// Shared application state, passed to handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    listener: IngressListener<Arc<dyn TaskQueue>>,
    store: Arc<dyn ContributionStore>,

    /// Secret for HMAC-SHA256 signal signatures.
    signal_secret: Vec<u8>,
}

impl AppState {
    pub fn new(
        listener: IngressListener<Arc<dyn TaskQueue>>,
        store: Arc<dyn ContributionStore>,
        signal_secret: impl Into<Vec<u8>>,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                listener,
                store,
                signal_secret: signal_secret.into(),
            }),
        }
    }

    pub fn listener(&self) -> &IngressListener<Arc<dyn TaskQueue>> {
        &self.inner.listener
    }

    pub fn store(&self) -> &dyn ContributionStore {
        self.inner.store.as_ref()
    }

    pub fn signal_secret(&self) -> &[u8] {
        &self.inner.signal_secret
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/signals", post(signal_handler))
        .route(
            "/api/v1/pages/{page_id}/contributions",
            get(page_contributions_handler),
        )
        .route(
            "/api/v1/events/{event_id}/contributions",
            get(event_contributions_handler),
        )
        .route("/api/v1/tasks", get(tasks_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
}
