//! The reconciliation job for a single page.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info, instrument};

use super::Result;
use super::plan::{DesiredPageState, plan_updates};
use crate::host::{PageStateReader, RevisionVisibilityReader};
use crate::store::ContributionStore;
use crate::types::{ContributionRecord, PageId, RevisionId};

/// What one pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub page: PageId,

    /// Rows found for the page.
    pub examined: usize,

    /// Rows rewritten by this pass.
    pub updated: usize,
}

/// Rewrites a page's contributions to match the host's current state.
///
/// All collaborators are injected; the job holds no other state and may be
/// shared between workers.
#[derive(Debug)]
pub struct ReconciliationJob<S, P, R> {
    store: S,
    pages: P,
    revisions: R,
}

impl<S, P, R> ReconciliationJob<S, P, R>
where
    S: ContributionStore,
    P: PageStateReader,
    R: RevisionVisibilityReader,
{
    pub fn new(store: S, pages: P, revisions: R) -> Self {
        ReconciliationJob {
            store,
            pages,
            revisions,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs one pass for `page`.
    ///
    /// `captured_title` is the title recorded by a move trigger. It is used only
    /// when the host cannot report the page's current title.
    #[instrument(skip(self, captured_title), fields(page = %page))]
    pub fn run_reconciliation(
        &self,
        page: PageId,
        captured_title: Option<&str>,
    ) -> Result<ReconcileOutcome> {
        let records = self.store.find_by_page(page)?;
        if records.is_empty() {
            debug!("No tracked contributions, nothing to do");
            return Ok(ReconcileOutcome {
                page,
                examined: 0,
                updated: 0,
            });
        }

        let page_state = self.pages.page_state(page)?;
        let revision_visible = if page_state.exists {
            self.revision_visibility(&records)?
        } else {
            // Every row is deleted regardless of revision state.
            HashMap::new()
        };

        let desired = DesiredPageState {
            page: &page_state,
            captured_title,
            revision_visible: &revision_visible,
        };
        let updates = plan_updates(&records, &desired);

        if !updates.is_empty() {
            self.store.apply_updates(&updates)?;
            info!(
                examined = records.len(),
                updated = updates.len(),
                exists = page_state.exists,
                "Reconciled page contributions"
            );
        } else {
            debug!(examined = records.len(), "Page contributions already consistent");
        }

        Ok(ReconcileOutcome {
            page,
            examined: records.len(),
            updated: updates.len(),
        })
    }

    /// Queries each distinct revision once.
    fn revision_visibility(
        &self,
        records: &[ContributionRecord],
    ) -> Result<HashMap<RevisionId, bool>> {
        let mut visible = HashMap::new();
        for record in records {
            let revision = record.revision_id();
            if !visible.contains_key(&revision) {
                visible.insert(revision, self.revisions.is_revision_visible(revision)?);
            }
        }
        Ok(visible)
    }
}
