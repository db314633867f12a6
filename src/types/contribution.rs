//! Contribution records: edits made under an event context.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{CentralUserId, EventId, PageId, RevisionId, WikiId};

/// Unique identity of a contribution.
///
/// Ordering is page first, then revision, so that a range of keys for one page
/// comes out in revision order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContributionKey {
    pub event_id: EventId,
    pub wiki_id: WikiId,
    pub page_id: PageId,
    pub revision_id: RevisionId,
}

impl ContributionKey {
    pub fn new(
        event_id: EventId,
        wiki_id: impl Into<WikiId>,
        page_id: PageId,
        revision_id: RevisionId,
    ) -> Self {
        ContributionKey {
            event_id,
            wiki_id: wiki_id.into(),
            page_id,
            revision_id,
        }
    }
}

impl PartialOrd for ContributionKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ContributionKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.page_id, self.revision_id, self.event_id, &self.wiki_id).cmp(&(
            other.page_id,
            other.revision_id,
            other.event_id,
            &other.wiki_id,
        ))
    }
}

impl fmt::Display for ContributionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/page {}/{}",
            self.event_id, self.wiki_id, self.page_id, self.revision_id
        )
    }
}

/// A contribution: one edit linked to one event.
///
/// Only `page_prefixed_text` and `is_deleted` are mutable after creation, and
/// only the reconciliation job writes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionRecord {
    pub key: ContributionKey,

    /// Namespace number of the page at edit time.
    pub page_namespace: i32,

    /// Current title of the page, including namespace prefix.
    pub page_prefixed_text: String,

    /// Parent revision, `None` for a page creation.
    pub parent_revision_id: Option<RevisionId>,

    /// Signed size change of the edit in bytes.
    pub bytes_delta: i64,

    /// When the edit was made.
    pub timestamp: DateTime<Utc>,

    /// Who made the edit.
    pub user_id: CentralUserId,

    /// User name at the time of the edit.
    pub user_name: String,

    /// Whether the contribution is hidden (page deleted or revision suppressed).
    pub is_deleted: bool,
}

impl ContributionRecord {
    pub fn page_id(&self) -> PageId {
        self.key.page_id
    }

    pub fn revision_id(&self) -> RevisionId {
        self.key.revision_id
    }

    /// True if this edit created the page.
    pub fn is_page_creation(&self) -> bool {
        self.parent_revision_id.is_none()
    }

    /// Returns a copy with the reconciled mutable fields replaced.
    pub fn with_reconciled(&self, page_prefixed_text: &str, is_deleted: bool) -> Self {
        ContributionRecord {
            page_prefixed_text: page_prefixed_text.to_string(),
            is_deleted,
            ..self.clone()
        }
    }
}
