//! One session of the launch feed.
//!
//! [`LaunchFeed`] wires the store, the sync coordinator and the derived
//! stages together:
//!
//! ```text
//! fetcher -> sync -> store -> filter (+ keyword, clock) -> grouping -> diff
//! ```
//!
//! Each derived stage runs on its own thread. Dropping the feed stops them.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Result;

use crate::clock::{SharedClock, SystemClock};
use crate::config::{AppConfig, TimeZoneSetting};
use crate::countdown::{CountdownTicker, DEFAULT_TICK_INTERVAL};
use crate::diff::{DiffStage, FeedUpdate};
use crate::error::{FeedError, FeedResult};
use crate::filter::{FilterEngine, FilterState};
use crate::grouping::{DateBucket, DateFormatter, GroupingStage, MediumDateFormatter};
use crate::live::Subscription;
use crate::model::LaunchRecord;
use crate::remote::RemoteFetcher;
use crate::storage::StorageHandle;
use crate::store::LaunchStore;
use crate::sync::{RefreshOutcome, SyncCoordinator, SyncState};

#[derive(Clone)]
pub struct FeedSettings {
    pub page_size: usize,
    pub tick_interval: Duration,
    pub clock: SharedClock,
    pub formatter: Arc<dyn DateFormatter>,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            tick_interval: DEFAULT_TICK_INTERVAL,
            clock: Arc::new(SystemClock),
            formatter: Arc::new(MediumDateFormatter::local()),
        }
    }
}

impl FeedSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let formatter = match config.display.time_zone {
            TimeZoneSetting::Local => MediumDateFormatter::local(),
            TimeZoneSetting::Utc => MediumDateFormatter::utc(),
        };
        tracing::debug!(time_zone = ?config.display.time_zone, "grouping launches by date");
        Self {
            page_size: config.feed.page_size,
            tick_interval: config.countdown.tick_interval(),
            clock: Arc::new(SystemClock),
            formatter: Arc::new(formatter),
        }
    }
}

pub struct LaunchFeed {
    // Downstream stages first so they are joined before their sources go away.
    updates: DiffStage,
    grouping: GroupingStage,
    filtering: FilterEngine,
    keyword: FilterState,
    sync: SyncCoordinator,
    store: Arc<LaunchStore>,
    clock: SharedClock,
    tick_interval: Duration,
}

impl LaunchFeed {
    pub fn open(
        storage: StorageHandle,
        fetcher: Arc<dyn RemoteFetcher>,
        settings: FeedSettings,
    ) -> Result<Self> {
        let store = Arc::new(LaunchStore::open(storage)?);
        let sync = SyncCoordinator::new(Arc::clone(&store), fetcher, settings.page_size);
        let keyword = FilterState::new();
        let filtering = FilterEngine::spawn(store.all(), keyword.subscribe(), settings.clock.clone())?;
        let grouping = GroupingStage::spawn(filtering.subscribe(), settings.formatter)?;
        let updates = DiffStage::spawn(grouping.subscribe())?;
        tracing::info!(page_size = settings.page_size, "launch feed opened");
        Ok(Self {
            updates,
            grouping,
            filtering,
            keyword,
            sync,
            store,
            clock: settings.clock,
            tick_interval: settings.tick_interval,
        })
    }

    pub fn refresh(&self) -> RefreshOutcome {
        self.sync.refresh()
    }

    pub fn refresh_in_background(&self) -> Option<JoinHandle<RefreshOutcome>> {
        self.sync.refresh_in_background()
    }

    pub fn dismiss_error(&self) {
        self.sync.dismiss_error();
    }

    pub fn set_filter(&self, keyword: impl Into<String>) {
        self.keyword.set(keyword);
    }

    pub fn filter(&self) -> String {
        self.keyword.get()
    }

    pub fn sync_state(&self) -> Subscription<SyncState> {
        self.sync.state()
    }

    pub fn records(&self) -> Subscription<Vec<LaunchRecord>> {
        self.store.all()
    }

    pub fn filtered(&self) -> Subscription<Vec<LaunchRecord>> {
        self.filtering.subscribe()
    }

    pub fn grouped(&self) -> Subscription<Vec<DateBucket>> {
        self.grouping.subscribe()
    }

    pub fn updates(&self) -> Subscription<FeedUpdate> {
        self.updates.subscribe()
    }

    pub fn launch(&self, id: &str) -> FeedResult<LaunchRecord> {
        self.store
            .by_id(id)?
            .ok_or_else(|| FeedError::NotFound { id: id.to_string() })
    }

    /// A ticker already counting down to launch `id`.
    pub fn countdown(&self, id: &str) -> FeedResult<CountdownTicker> {
        let mut ticker = CountdownTicker::new(self.clock.clone(), self.tick_interval);
        ticker.select_by_id(&self.store, id)?;
        Ok(ticker)
    }

    pub fn store(&self) -> &LaunchStore {
        &self.store
    }
}
