//! Pure planning step of a reconciliation pass.
//!
//! Given the stored rows for one page and the host's current view of that
//! page, decides which rows need rewriting. No I/O happens here.

use std::collections::HashMap;

use crate::host::PageState;
use crate::invariants::effective_deleted_state;
use crate::types::{ContributionRecord, RevisionId};

/// The state every contribution of a page should converge to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredPageState<'a> {
    pub page: &'a PageState,

    /// Title captured from a move signal, used only when the host has none.
    pub captured_title: Option<&'a str>,

    /// Visibility per revision. A revision missing from the map counts as not
    /// visible.
    pub revision_visible: &'a HashMap<RevisionId, bool>,
}

impl DesiredPageState<'_> {
    /// Title a record should carry; falls back to the record's own text when
    /// neither the host nor the trigger knows one.
    pub fn prefixed_text_for<'r>(&'r self, record: &'r ContributionRecord) -> &'r str {
        self.page
            .prefixed_text
            .as_deref()
            .or(self.captured_title)
            .unwrap_or(&record.page_prefixed_text)
    }

    pub fn deleted_for(&self, record: &ContributionRecord) -> bool {
        let revision_visible = self
            .revision_visible
            .get(&record.revision_id())
            .copied()
            .unwrap_or(false);
        effective_deleted_state(self.page.exists, revision_visible)
    }
}

/// Returns the rows whose title or deleted flag differ from the desired state,
/// already rewritten to that state. Rows that already match are skipped.
pub fn plan_updates(
    records: &[ContributionRecord],
    desired: &DesiredPageState<'_>,
) -> Vec<ContributionRecord> {
    records
        .iter()
        .filter_map(|record| {
            let want_text = desired.prefixed_text_for(record);
            let want_deleted = desired.deleted_for(record);
            if want_text == record.page_prefixed_text && want_deleted == record.is_deleted {
                None
            } else {
                Some(record.with_reconciled(want_text, want_deleted))
            }
        })
        .collect()
}
