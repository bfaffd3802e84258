use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::FeedError;
use crate::live::{LiveValue, Subscription};
use crate::remote::{RemoteFetcher, UpcomingQuery};
use crate::store::LaunchStore;

/// The only failure text a consumer ever sees from a refresh.
pub const NETWORK_ERROR_MESSAGE: &str = "Network Error";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    pub is_loading: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Another refresh was already in flight; nothing was fetched.
    Skipped,
    Merged { count: usize },
    Failed,
}

/// Runs at most one fetch-and-merge cycle at a time.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<SyncInner>,
}

struct SyncInner {
    store: Arc<LaunchStore>,
    fetcher: Arc<dyn RemoteFetcher>,
    page_size: usize,
    in_flight: AtomicBool,
    state: LiveValue<SyncState>,
}

/// Holds the in-flight slot; releasing it clears `is_loading` even on unwind.
struct RefreshGuard {
    inner: Arc<SyncInner>,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.inner.state.modify(|state| state.is_loading = false);
        self.inner.in_flight.store(false, Ordering::Release);
    }
}

impl SyncCoordinator {
    pub fn new(store: Arc<LaunchStore>, fetcher: Arc<dyn RemoteFetcher>, page_size: usize) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                store,
                fetcher,
                page_size,
                in_flight: AtomicBool::new(false),
                state: LiveValue::new(SyncState::default()),
            }),
        }
    }

    /// Fetches the first page and merges it into the store on the calling
    /// thread. Returns [`RefreshOutcome::Skipped`] if a refresh is running.
    pub fn refresh(&self) -> RefreshOutcome {
        match self.begin() {
            Some(guard) => guard.inner.load_and_update(),
            None => RefreshOutcome::Skipped,
        }
    }

    /// Same as [`refresh`](Self::refresh) on a background thread. `None` when
    /// skipped or when the thread could not be started.
    pub fn refresh_in_background(&self) -> Option<JoinHandle<RefreshOutcome>> {
        let guard = self.begin()?;
        let spawned = thread::Builder::new()
            .name("launch-refresh".to_string())
            .spawn(move || guard.inner.load_and_update());
        match spawned {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::error!(?err, "failed to spawn refresh thread");
                None
            }
        }
    }

    pub fn dismiss_error(&self) {
        self.inner.state.modify(|state| state.last_error = None);
    }

    pub fn state(&self) -> Subscription<SyncState> {
        self.inner.state.subscribe()
    }

    pub fn current(&self) -> SyncState {
        self.inner.state.latest().unwrap_or_default()
    }

    fn begin(&self) -> Option<RefreshGuard> {
        if self
            .inner
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("refresh already in flight, skipping");
            return None;
        }
        self.inner.state.modify(|state| state.is_loading = true);
        Some(RefreshGuard {
            inner: Arc::clone(&self.inner),
        })
    }
}

impl SyncInner {
    fn load_and_update(&self) -> RefreshOutcome {
        let query = UpcomingQuery::first_page(self.page_size);
        let merged = self
            .fetcher
            .fetch_upcoming(&query)
            .map_err(FeedError::from)
            .and_then(|page| {
                tracing::debug!(count = page.count, received = page.results.len(), "fetched launches");
                self.store
                    .upsert_all(&page.results)
                    .map_err(FeedError::Storage)
            });
        match merged {
            Ok(count) => {
                tracing::info!(count, "merged remote launches");
                RefreshOutcome::Merged { count }
            }
            Err(err) => {
                tracing::error!(error = %err, "launch refresh failed");
                self.state
                    .modify(|state| state.last_error = Some(NETWORK_ERROR_MESSAGE.to_string()));
                RefreshOutcome::Failed
            }
        }
    }
}
