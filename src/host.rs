//! Capabilities consumed from the host wiki.
//!
//! The host owns page and revision state and emits life-cycle signals. The
//! engine only sees it through these narrow traits, so every piece of
//! reconciliation logic can be exercised against fakes.
//!
//! # Example (fake for testing)
//!
//! ```ignore
//! struct FixedPage { exists: bool, title: String }
//!
//! impl PageStateReader for FixedPage {
//!     fn page_currently_exists(&self, _page: PageId) -> Result<bool, HostQueryError> {
//!         Ok(self.exists)
//!     }
//!
//!     fn current_prefixed_title(&self, _page: PageId) -> Result<Option<String>, HostQueryError> {
//!         Ok(Some(self.title.clone()))
//!     }
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::invariants::{RevisionVisibility, is_revision_publicly_visible};
use crate::types::{PageId, RevisionId};

/// A page or revision query could not be answered.
///
/// Always treated as transient: the job aborts without writing and retries.
#[derive(Debug, Error)]
#[error("host query failed for {subject}: {message}")]
pub struct HostQueryError {
    /// What was being queried (e.g. `page 7`, `revision r100`).
    pub subject: String,

    /// A human-readable description of the failure.
    pub message: String,
}

impl HostQueryError {
    pub fn page(page: PageId, message: impl Into<String>) -> Self {
        HostQueryError {
            subject: format!("page {}", page),
            message: message.into(),
        }
    }

    pub fn revision(revision: RevisionId, message: impl Into<String>) -> Self {
        HostQueryError {
            subject: format!("revision {}", revision),
            message: message.into(),
        }
    }
}

/// Snapshot of a page's current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageState {
    pub exists: bool,

    /// Current prefixed title, if the host still knows it.
    pub prefixed_text: Option<String>,
}

/// Reads current page existence and title.
pub trait PageStateReader: Send + Sync {
    /// Returns false if the page is currently deleted (or never existed).
    fn page_currently_exists(&self, page: PageId) -> Result<bool, HostQueryError>;

    /// Returns the page's current prefixed title, or `None` if unknown.
    fn current_prefixed_title(&self, page: PageId) -> Result<Option<String>, HostQueryError>;

    /// Reads both existence and title.
    fn page_state(&self, page: PageId) -> Result<PageState, HostQueryError> {
        Ok(PageState {
            exists: self.page_currently_exists(page)?,
            prefixed_text: self.current_prefixed_title(page)?,
        })
    }
}

/// Reads per-revision visibility.
pub trait RevisionVisibilityReader: Send + Sync {
    /// Returns the revision's visibility flags, or `None` if the host has no
    /// such revision in any page history.
    fn revision_visibility(
        &self,
        revision: RevisionId,
    ) -> Result<Option<RevisionVisibility>, HostQueryError>;

    /// Returns true if the revision exists and is publicly visible.
    fn is_revision_visible(&self, revision: RevisionId) -> Result<bool, HostQueryError> {
        Ok(self
            .revision_visibility(revision)?
            .is_some_and(is_revision_publicly_visible))
    }
}

impl<T: PageStateReader + ?Sized> PageStateReader for Arc<T> {
    fn page_currently_exists(&self, page: PageId) -> Result<bool, HostQueryError> {
        (**self).page_currently_exists(page)
    }

    fn current_prefixed_title(&self, page: PageId) -> Result<Option<String>, HostQueryError> {
        (**self).current_prefixed_title(page)
    }
}

impl<T: RevisionVisibilityReader + ?Sized> RevisionVisibilityReader for Arc<T> {
    fn revision_visibility(
        &self,
        revision: RevisionId,
    ) -> Result<Option<RevisionVisibility>, HostQueryError> {
        (**self).revision_visibility(revision)
    }
}

/// A page life-cycle notification from the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleSignal {
    PageDeleted {
        page_id: PageId,
    },
    PageUndeleted {
        page_id: PageId,
        #[serde(default)]
        revision_ids: Vec<RevisionId>,
    },
    PageMoved {
        page_id: PageId,
        new_prefixed_title: String,
    },
    RevisionVisibilityChanged {
        page_id: PageId,
        revision_id: RevisionId,
    },
}

impl LifecycleSignal {
    pub fn page_id(&self) -> PageId {
        match self {
            LifecycleSignal::PageDeleted { page_id }
            | LifecycleSignal::PageUndeleted { page_id, .. }
            | LifecycleSignal::PageMoved { page_id, .. }
            | LifecycleSignal::RevisionVisibilityChanged { page_id, .. } => *page_id,
        }
    }
}

/// A stream of life-cycle signals.
pub trait LifecycleSignalSource {
    /// Waits for the next signal. Returns `None` once the source is closed.
    fn next_signal(&mut self) -> impl Future<Output = Option<LifecycleSignal>> + Send;
}

/// Signal source backed by a tokio channel.
///
/// The host side holds the [`mpsc::Sender`] returned by [`ChannelSignalSource::new`].
#[derive(Debug)]
pub struct ChannelSignalSource {
    rx: mpsc::Receiver<LifecycleSignal>,
}

impl ChannelSignalSource {
    pub fn new(buffer: usize) -> (mpsc::Sender<LifecycleSignal>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, ChannelSignalSource { rx })
    }
}

impl LifecycleSignalSource for ChannelSignalSource {
    fn next_signal(&mut self) -> impl Future<Output = Option<LifecycleSignal>> + Send {
        self.rx.recv()
    }
}
