//! Sync engine for a project's target grade history.
//!
//! Owns the history set and page state. Everything the UI reads comes out
//! of [`SyncEngine::view`] or the [`SyncEngine::subscribe`] channel; the only
//! writes are the refresh completion path, paging, project changes and
//! disposal.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;

use crate::fetch::{FetchError, HistoryFetcher};
use crate::grades::GradeLookup;
use crate::history::{has_changed, normalize_all, HistoryRecord, HistoryResponse};
use crate::page::PageState;
use crate::poller::{self, PollerHandle};

pub const LOAD_ERROR_MESSAGE: &str = "Failed to load target grade history";
pub const MISSING_PROJECT_MESSAGE: &str = "Project ID is required";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Settled,
    Failed,
}

/// What started a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Initial,
    Poll,
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Initial => write!(f, "initial"),
            Trigger::Poll => write!(f, "poll"),
            Trigger::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// History set replaced.
    Updated,
    /// Server data matched what is held; nothing replaced.
    Unchanged,
    Failed(FetchError),
    /// Another refresh was outstanding (poll ticks only).
    Skipped,
    /// Result arrived after disposal or after the project changed.
    Discarded,
    /// No project to fetch for.
    NoProject,
}

impl RefreshOutcome {
    /// Whether a fetch was actually completed and applied.
    pub fn ran(&self) -> bool {
        matches!(
            self,
            RefreshOutcome::Updated | RefreshOutcome::Unchanged | RefreshOutcome::Failed(_)
        )
    }
}

/// Snapshot of everything a presentation layer may depend on.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryView {
    pub project_id: u64,
    pub phase: Phase,
    pub loading: bool,
    pub error: Option<String>,
    pub last_failure: Option<FetchError>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_records: usize,
    /// Records on the current page.
    pub records: Vec<HistoryRecord>,
    /// Bumped every time the history set is replaced.
    pub revision: u64,
}

struct EngineState {
    project_id: u64,
    generation: u64,
    /// Cancels fetches started for the current generation.
    fetch_token: CancellationToken,
    phase: Phase,
    error: Option<String>,
    last_failure: Option<FetchError>,
    history: Vec<HistoryRecord>,
    /// A fetch has succeeded for the current project.
    loaded: bool,
    page: PageState,
    revision: u64,
    disposed: bool,
}

impl EngineState {
    fn new(items_per_page: usize, fetch_token: CancellationToken) -> Self {
        Self {
            project_id: 0,
            generation: 0,
            fetch_token,
            phase: Phase::Idle,
            error: None,
            last_failure: None,
            history: Vec::new(),
            loaded: false,
            page: PageState::new(items_per_page),
            revision: 0,
            disposed: false,
        }
    }

    fn view(&self) -> HistoryView {
        HistoryView {
            project_id: self.project_id,
            phase: self.phase,
            loading: self.phase == Phase::Loading,
            error: self.error.clone(),
            last_failure: self.last_failure.clone(),
            current_page: self.page.current_page,
            total_pages: self.page.total_pages,
            total_records: self.history.len(),
            records: self.page.window(&self.history).to_vec(),
            revision: self.revision,
        }
    }

    /// Switch to a new project generation, aborting fetches for the old one.
    fn next_generation(&mut self, shutdown: &CancellationToken) {
        self.fetch_token.cancel();
        self.fetch_token = shutdown.child_token();
        self.generation += 1;
    }

    fn replace_history(&mut self, history: Vec<HistoryRecord>) {
        self.history = history;
        self.page.recompute(self.history.len());
        self.revision += 1;
    }
}

struct Inner {
    fetcher: Arc<dyn HistoryFetcher>,
    grades: Arc<dyn GradeLookup>,
    state: Mutex<EngineState>,
    views: watch::Sender<HistoryView>,
    /// Held for the whole of a refresh cycle.
    refresh_slot: AsyncMutex<()>,
    shutdown: CancellationToken,
    poller: Mutex<Option<PollerHandle>>,
}

/// Cheap to clone; all clones drive the same engine.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

impl SyncEngine {
    pub fn new(
        fetcher: Arc<dyn HistoryFetcher>,
        grades: Arc<dyn GradeLookup>,
        items_per_page: usize,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let state = EngineState::new(items_per_page, shutdown.child_token());
        let (views, _) = watch::channel(state.view());

        Self {
            inner: Arc::new(Inner {
                fetcher,
                grades,
                state: Mutex::new(state),
                views,
                refresh_slot: AsyncMutex::new(()),
                shutdown,
                poller: Mutex::new(None),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &EngineState) {
        self.inner.views.send_replace(state.view());
    }

    pub fn view(&self) -> HistoryView {
        self.state().view()
    }

    /// Receive a new [`HistoryView`] on every observable change.
    pub fn subscribe(&self) -> watch::Receiver<HistoryView> {
        self.inner.views.subscribe()
    }

    /// First load for `project_id`.
    pub async fn initialize(&self, project_id: u64) -> RefreshOutcome {
        {
            let mut state = self.state();
            if state.disposed {
                return RefreshOutcome::Discarded;
            }
            if state.project_id != project_id {
                state.project_id = project_id;
                state.next_generation(&self.inner.shutdown);
            }
        }
        self.run_refresh(Trigger::Initial).await
    }

    /// The host switched to a different project: back to page 1 and load it
    /// from scratch. A fetch still running for the old project is aborted.
    pub async fn on_project_change(&self, project_id: u64) -> RefreshOutcome {
        {
            let mut state = self.state();
            if state.disposed {
                return RefreshOutcome::Discarded;
            }
            if state.project_id == project_id {
                return RefreshOutcome::Skipped;
            }

            tracing::info!(from = state.project_id, to = project_id, "Project changed");
            state.project_id = project_id;
            state.next_generation(&self.inner.shutdown);
            state.loaded = false;
            state.error = None;
            state.last_failure = None;
            state.page.reset();
            if !state.history.is_empty() {
                state.replace_history(Vec::new());
            }
            state.page.recompute(0);
            state.phase = Phase::Loading;
            self.publish(&state);
        }
        self.run_refresh(Trigger::Initial).await
    }

    /// The project's target grade was changed elsewhere; a new history entry
    /// should exist, so fetch now instead of waiting for the next tick.
    pub async fn on_target_grade_change(&self) -> RefreshOutcome {
        self.run_refresh(Trigger::Manual).await
    }

    /// Manual refresh. Waits for an outstanding refresh to finish first.
    pub async fn refresh(&self) -> RefreshOutcome {
        self.run_refresh(Trigger::Manual).await
    }

    /// Poll-tick refresh. Dropped if another refresh is outstanding.
    pub async fn poll(&self) -> RefreshOutcome {
        self.run_refresh(Trigger::Poll).await
    }

    /// Show `page` of the held history. Out-of-range pages change nothing.
    /// Never fetches.
    pub fn go_to_page(&self, page: usize) -> bool {
        let mut state = self.state();
        if state.disposed || !state.page.go_to(page) {
            return false;
        }
        self.publish(&state);
        true
    }

    /// Start refreshing every `period`. Replaces any running poller.
    pub fn start_polling(&self, period: Duration) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let handle = poller::spawn(period, self.inner.shutdown.child_token(), move || {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(inner) => SyncEngine { inner }.poll().await.ran(),
                    None => false,
                }
            }
        });

        let mut slot = self.inner.poller.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = slot.replace(handle) {
            old.cancel();
        }
        tracing::debug!(period_ms = period.as_millis() as u64, "Polling started");
    }

    /// Stop polling and drop the history. Results still in flight are
    /// discarded. Safe to call more than once.
    pub fn dispose(&self) {
        self.inner.shutdown.cancel();

        if let Some(handle) = self
            .inner
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.cancel();
        }

        let mut state = self.state();
        if state.disposed {
            return;
        }
        state.disposed = true;
        if !state.history.is_empty() {
            state.replace_history(Vec::new());
        }
        state.phase = Phase::Idle;
        self.publish(&state);
        tracing::debug!(project_id = state.project_id, "Engine disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    async fn run_refresh(&self, trigger: Trigger) -> RefreshOutcome {
        let _slot = match trigger {
            Trigger::Poll => match self.inner.refresh_slot.try_lock() {
                Ok(guard) => guard,
                Err(_) => return RefreshOutcome::Skipped,
            },
            Trigger::Initial | Trigger::Manual => self.inner.refresh_slot.lock().await,
        };

        let (project_id, generation, fetch_token) = {
            let mut state = self.state();
            if state.disposed {
                return RefreshOutcome::Discarded;
            }
            if state.project_id == 0 {
                tracing::error!("No project id provided");
                state.error = Some(MISSING_PROJECT_MESSAGE.to_string());
                state.phase = Phase::Failed;
                self.publish(&state);
                return RefreshOutcome::NoProject;
            }
            state.phase = Phase::Loading;
            self.publish(&state);
            (state.project_id, state.generation, state.fetch_token.clone())
        };

        let result = tokio::select! {
            biased;
            _ = fetch_token.cancelled() => {
                tracing::debug!(project_id, %trigger, "History fetch aborted");
                return RefreshOutcome::Discarded;
            }
            result = self.inner.fetcher.fetch(project_id) => result,
        };

        let mut state = self.state();
        if state.disposed || state.generation != generation {
            tracing::debug!(project_id, %trigger, "Discarding stale history result");
            return RefreshOutcome::Discarded;
        }

        let outcome = match result {
            Ok(response) => self.apply_success(&mut state, response),
            Err(e) => self.apply_failure(&mut state, e, trigger),
        };
        self.publish(&state);
        outcome
    }

    fn apply_success(&self, state: &mut EngineState, response: HistoryResponse) -> RefreshOutcome {
        let candidate = normalize_all(response.target_grade_histories, self.inner.grades.as_ref());

        let outcome = if has_changed(&state.history, &candidate) {
            tracing::info!(
                project_id = state.project_id,
                records = candidate.len(),
                "Target grade history updated"
            );
            state.replace_history(candidate);
            RefreshOutcome::Updated
        } else {
            RefreshOutcome::Unchanged
        };

        state.loaded = true;
        state.error = None;
        state.last_failure = None;
        state.phase = Phase::Settled;
        outcome
    }

    fn apply_failure(&self, state: &mut EngineState, error: FetchError, trigger: Trigger) -> RefreshOutcome {
        tracing::warn!(
            project_id = state.project_id,
            %trigger,
            error = %error,
            "Error fetching target grade history"
        );

        // Keep stale data on screen; only an empty view gets the message.
        if !state.loaded {
            state.error = Some(LOAD_ERROR_MESSAGE.to_string());
        }
        state.last_failure = Some(error.clone());
        state.phase = Phase::Failed;
        RefreshOutcome::Failed(error)
    }
}
