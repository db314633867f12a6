//! Shared test utilities, fakes, and arbitrary generators for property-based testing.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use crate::host::{HostQueryError, LifecycleSignal, PageStateReader, RevisionVisibilityReader};
use crate::invariants::RevisionVisibility;
use crate::queue::{
    EnqueueOutcome, MemoryTaskQueue, QuarantinedTask, QueueError, Result as QueueResult,
    TaskQueue,
};
use crate::store::{ContributionStore, InMemoryContributionStore, StoreError};
use crate::types::{
    CentralUserId, ContributionKey, ContributionRecord, EventId, PageId, ReconcileReason,
    ReconciliationTask, RevisionId,
};

/// Builds a visible contribution on `enwiki` with deterministic immutable fields.
pub fn make_record(event: u64, page: u64, rev: u64, title: &str) -> ContributionRecord {
    ContributionRecord {
        key: ContributionKey::new(EventId(event), "enwiki", PageId(page), RevisionId(rev)),
        page_namespace: 0,
        page_prefixed_text: title.to_string(),
        parent_revision_id: Some(RevisionId(rev.saturating_sub(1))),
        bytes_delta: (rev % 97) as i64 - 40,
        timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        user_id: CentralUserId(42),
        user_name: "Example".to_string(),
        is_deleted: false,
    }
}

#[derive(Debug, Clone)]
struct FakePage {
    exists: bool,
    title: Option<String>,
}

/// An in-memory host wiki implementing both reader traits.
///
/// Pages and revisions are set directly by tests. Every query is counted, and
/// `fail_queries` makes all subsequent queries return [`HostQueryError`].
#[derive(Debug, Default)]
pub struct FakeHost {
    pages: Mutex<HashMap<PageId, FakePage>>,
    revisions: Mutex<HashMap<RevisionId, RevisionVisibility>>,
    failing: AtomicBool,
    panic_next: AtomicBool,
    page_queries: AtomicUsize,
    revision_queries: AtomicUsize,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_page(&self, page: PageId, exists: bool, title: Option<&str>) {
        self.pages.lock().unwrap().insert(
            page,
            FakePage {
                exists,
                title: title.map(str::to_string),
            },
        );
    }

    /// Creates an existing page whose listed revisions are all visible.
    pub fn add_page(&self, page: PageId, title: &str, revisions: &[u64]) {
        self.set_page(page, true, Some(title));
        for rev in revisions {
            self.set_revision(RevisionId(*rev), RevisionVisibility::VISIBLE);
        }
    }

    pub fn delete_page(&self, page: PageId) {
        if let Some(p) = self.pages.lock().unwrap().get_mut(&page) {
            p.exists = false;
        }
    }

    pub fn undelete_page(&self, page: PageId) {
        if let Some(p) = self.pages.lock().unwrap().get_mut(&page) {
            p.exists = true;
        }
    }

    pub fn move_page(&self, page: PageId, title: &str) {
        if let Some(p) = self.pages.lock().unwrap().get_mut(&page) {
            p.title = Some(title.to_string());
        }
    }

    pub fn set_revision(&self, revision: RevisionId, visibility: RevisionVisibility) {
        self.revisions.lock().unwrap().insert(revision, visibility);
    }

    pub fn remove_revision(&self, revision: RevisionId) {
        self.revisions.lock().unwrap().remove(&revision);
    }

    pub fn fail_queries(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes the next revision query panic, as a crashing host client would.
    pub fn panic_next_revision_query(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    pub fn page_queries(&self) -> usize {
        self.page_queries.load(Ordering::SeqCst)
    }

    pub fn revision_queries(&self) -> usize {
        self.revision_queries.load(Ordering::SeqCst)
    }

    fn page(&self, page: PageId) -> Result<Option<FakePage>, HostQueryError> {
        self.page_queries.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(HostQueryError::page(page, "host unavailable"));
        }
        Ok(self.pages.lock().unwrap().get(&page).cloned())
    }
}

impl PageStateReader for FakeHost {
    fn page_currently_exists(&self, page: PageId) -> Result<bool, HostQueryError> {
        Ok(self.page(page)?.is_some_and(|p| p.exists))
    }

    fn current_prefixed_title(&self, page: PageId) -> Result<Option<String>, HostQueryError> {
        Ok(self.page(page)?.and_then(|p| p.title))
    }
}

impl RevisionVisibilityReader for FakeHost {
    fn revision_visibility(
        &self,
        revision: RevisionId,
    ) -> Result<Option<RevisionVisibility>, HostQueryError> {
        self.revision_queries.fetch_add(1, Ordering::SeqCst);
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("revision reader crashed on {revision}");
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(HostQueryError::revision(revision, "host unavailable"));
        }
        Ok(self.revisions.lock().unwrap().get(&revision).copied())
    }
}

/// Wraps an in-memory queue whose first `n` enqueues fail with an IO error.
#[derive(Debug, Default)]
pub struct FlakyQueue {
    inner: MemoryTaskQueue,
    failures_left: AtomicUsize,
    enqueue_attempts: AtomicUsize,
}

impl FlakyQueue {
    pub fn failing_enqueues(n: usize) -> Self {
        FlakyQueue {
            failures_left: AtomicUsize::new(n),
            ..Self::default()
        }
    }

    pub fn enqueue_attempts(&self) -> usize {
        self.enqueue_attempts.load(Ordering::SeqCst)
    }
}

impl TaskQueue for FlakyQueue {
    fn enqueue(&self, task: ReconciliationTask) -> QueueResult<EnqueueOutcome> {
        self.enqueue_attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(QueueError::Io(std::io::Error::other("spool disk full")));
        }
        self.inner.enqueue(task)
    }

    fn claim_next(&self, now: DateTime<Utc>) -> QueueResult<Option<ReconciliationTask>> {
        self.inner.claim_next(now)
    }

    fn claim(&self, page: PageId, now: DateTime<Utc>) -> QueueResult<Option<ReconciliationTask>> {
        self.inner.claim(page, now)
    }

    fn complete(&self, page: PageId) -> QueueResult<()> {
        self.inner.complete(page)
    }

    fn release(&self, task: ReconciliationTask) -> QueueResult<()> {
        self.inner.release(task)
    }

    fn quarantine(&self, task: ReconciliationTask, error: &str) -> QueueResult<()> {
        self.inner.quarantine(task, error)
    }

    fn recover(&self) -> QueueResult<usize> {
        self.inner.recover()
    }

    fn pending(&self) -> QueueResult<Vec<ReconciliationTask>> {
        self.inner.pending()
    }

    fn quarantined(&self) -> QueueResult<Vec<QuarantinedTask>> {
        self.inner.quarantined()
    }
}

/// How a [`ScriptedStore`] should fail its next batch update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    Transient,
    NotFound,
    Poisoned,
}

/// Wraps an in-memory store, failing batch updates on demand and counting calls.
#[derive(Debug, Default)]
pub struct ScriptedStore {
    pub inner: InMemoryContributionStore,
    failures: Mutex<Vec<InjectedFailure>>,
    reads: AtomicUsize,
    batches: AtomicUsize,
}

impl ScriptedStore {
    pub fn with_records(records: impl IntoIterator<Item = ContributionRecord>) -> Self {
        ScriptedStore {
            inner: InMemoryContributionStore::with_records(records),
            ..Self::default()
        }
    }

    /// Queues failures for the next batch updates, in order.
    pub fn fail_next(&self, failures: &[InjectedFailure]) {
        let mut queued = self.failures.lock().unwrap();
        for f in failures.iter().rev() {
            queued.insert(0, *f);
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of batch updates that reached the store, successful or not.
    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }
}

impl ContributionStore for ScriptedStore {
    fn find_by_page(&self, page: PageId) -> Result<Vec<ContributionRecord>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_page(page)
    }

    fn find_by_page_and_revision(
        &self,
        page: PageId,
        revision: RevisionId,
    ) -> Result<Option<ContributionRecord>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_page_and_revision(page, revision)
    }

    fn find_by_event(&self, event: EventId) -> Result<Vec<ContributionRecord>, StoreError> {
        self.inner.find_by_event(event)
    }

    fn insert(&self, record: ContributionRecord) -> Result<(), StoreError> {
        self.inner.insert(record)
    }

    fn apply_updates(&self, updates: &[ContributionRecord]) -> Result<(), StoreError> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        let next = {
            let mut queued = self.failures.lock().unwrap();
            if queued.is_empty() {
                None
            } else {
                Some(queued.remove(0))
            }
        };
        match (next, updates.first()) {
            (Some(InjectedFailure::Transient), _) => {
                Err(StoreError::Transient("injected outage".to_string()))
            }
            (Some(InjectedFailure::Poisoned), _) => Err(StoreError::Poisoned),
            (Some(InjectedFailure::NotFound), Some(first)) => {
                Err(StoreError::NotFound(first.key.clone()))
            }
            _ => self.inner.apply_updates(updates),
        }
    }
}

pub fn arb_reason() -> impl Strategy<Value = ReconcileReason> {
    prop_oneof![
        Just(ReconcileReason::PageDeleted),
        Just(ReconcileReason::PageUndeleted),
        Just(ReconcileReason::PageMoved),
        Just(ReconcileReason::RevisionVisibilityChanged),
    ]
}

/// Life-cycle signals for pages 7 and 8, touching revisions below 50.
pub fn arb_signal() -> impl Strategy<Value = LifecycleSignal> {
    let page = (7u64..9).prop_map(PageId);
    prop_oneof![
        page.clone().prop_map(|page_id| LifecycleSignal::PageDeleted { page_id }),
        (page.clone(), prop::collection::vec(1u64..50, 0..3)).prop_map(|(page_id, revs)| {
            LifecycleSignal::PageUndeleted {
                page_id,
                revision_ids: revs.into_iter().map(RevisionId).collect(),
            }
        }),
        (page.clone(), arb_title()).prop_map(|(page_id, new_prefixed_title)| {
            LifecycleSignal::PageMoved {
                page_id,
                new_prefixed_title,
            }
        }),
        (page, 1u64..50).prop_map(|(page_id, rev)| LifecycleSignal::RevisionVisibilityChanged {
            page_id,
            revision_id: RevisionId(rev),
        }),
    ]
}

pub fn arb_visibility() -> impl Strategy<Value = RevisionVisibility> {
    (0u8..16).prop_map(RevisionVisibility::from_bits)
}

pub fn arb_title() -> impl Strategy<Value = String> {
    "[A-Z][a-z]{0,8}(:[A-Z][a-z]{0,8})?".prop_map(String::from)
}

/// A page's stored rows plus the host's view of it.
#[derive(Debug, Clone)]
pub struct PageScenario {
    pub records: Vec<ContributionRecord>,
    pub exists: bool,
    pub host_title: Option<String>,
    /// Host visibility per stored revision; `None` means the host has no such revision.
    pub visibility: BTreeMap<RevisionId, Option<RevisionVisibility>>,
}

impl PageScenario {
    pub fn install(&self, host: &FakeHost, page: PageId) {
        host.set_page(page, self.exists, self.host_title.as_deref());
        for (rev, vis) in &self.visibility {
            match vis {
                Some(v) => host.set_revision(*rev, *v),
                None => host.remove_revision(*rev),
            }
        }
    }
}

/// Random rows for page 7 with arbitrary stored state, and a random host view.
pub fn arb_page_scenario() -> impl Strategy<Value = PageScenario> {
    (
        prop::collection::btree_map(
            1u64..50,
            (1u64..4, arb_title(), any::<bool>(), prop::option::of(arb_visibility())),
            0..8,
        ),
        any::<bool>(),
        prop::option::of(arb_title()),
    )
        .prop_map(|(rows, exists, host_title)| {
            let mut records = Vec::new();
            let mut visibility = BTreeMap::new();
            for (rev, (event, title, deleted, vis)) in rows {
                let mut record = make_record(event, 7, rev, &title);
                record.is_deleted = deleted;
                records.push(record);
                visibility.insert(RevisionId(rev), vis);
            }
            PageScenario {
                records,
                exists,
                host_title,
                visibility,
            }
        })
}
