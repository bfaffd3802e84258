use anyhow::Result;
use crossbeam_channel::select;
use time::OffsetDateTime;

use crate::clock::SharedClock;
use crate::live::{LiveValue, Subscription};
use crate::model::LaunchRecord;
use crate::worker::Worker;

/// Mission-name keyword match.
///
/// A launch without a mission name never matches, not even the empty keyword.
pub fn matches_keyword(mission_name: Option<&str>, keyword: &str) -> bool {
    let Some(name) = mission_name.filter(|name| !name.is_empty()) else {
        return false;
    };
    if keyword.is_empty() {
        return true;
    }
    name.to_lowercase().contains(&keyword.to_lowercase())
}

pub fn is_visible(launch: &LaunchRecord, keyword: &str, now: OffsetDateTime) -> bool {
    matches_keyword(launch.mission_name(), keyword) && launch.net > now
}

pub fn apply(launches: &[LaunchRecord], keyword: &str, now: OffsetDateTime) -> Vec<LaunchRecord> {
    launches
        .iter()
        .filter(|launch| is_visible(launch, keyword, now))
        .cloned()
        .collect()
}

/// The user's current filter keyword.
#[derive(Clone)]
pub struct FilterState {
    keyword: LiveValue<String>,
}

impl Default for FilterState {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterState {
    pub fn new() -> Self {
        Self {
            keyword: LiveValue::new(String::new()),
        }
    }

    pub fn set(&self, keyword: impl Into<String>) {
        self.keyword.publish_if_changed(keyword.into());
    }

    pub fn get(&self) -> String {
        self.keyword.latest().unwrap_or_default()
    }

    pub fn subscribe(&self) -> Subscription<String> {
        self.keyword.subscribe()
    }
}

/// Keeps the visible launch list in sync with the store and the keyword.
pub struct FilterEngine {
    output: LiveValue<Vec<LaunchRecord>>,
    _worker: Worker,
}

impl FilterEngine {
    pub fn spawn(
        launches: Subscription<Vec<LaunchRecord>>,
        keyword: Subscription<String>,
        clock: SharedClock,
    ) -> Result<Self> {
        let output = LiveValue::new(Vec::new());
        let publisher = output.clone();
        let worker = Worker::spawn("launch-filter", move |shutdown| {
            let mut latest_launches: Option<Vec<LaunchRecord>> = None;
            let mut latest_keyword: Option<String> = None;
            'events: loop {
                select! {
                    recv(shutdown) -> _ => break 'events,
                    recv(launches.receiver()) -> msg => match msg {
                        Ok(value) => latest_launches = Some(value),
                        Err(_) => break 'events,
                    },
                    recv(keyword.receiver()) -> msg => match msg {
                        Ok(value) => latest_keyword = Some(value),
                        Err(_) => break 'events,
                    },
                }
                // Newest pairing wins; queued intermediates are dropped.
                if let Some(value) = launches.try_latest() {
                    latest_launches = Some(value);
                }
                if let Some(value) = keyword.try_latest() {
                    latest_keyword = Some(value);
                }
                let (Some(all), Some(current)) = (&latest_launches, &latest_keyword) else {
                    continue 'events;
                };
                let visible = apply(all, current, clock.now());
                let count = visible.len();
                if publisher.publish_if_changed(visible) {
                    tracing::debug!(count, keyword = %current, "filtered launches changed");
                }
            }
        })?;
        Ok(Self {
            output,
            _worker: worker,
        })
    }

    pub fn subscribe(&self) -> Subscription<Vec<LaunchRecord>> {
        self.output.subscribe()
    }

    pub fn latest(&self) -> Vec<LaunchRecord> {
        self.output.latest().unwrap_or_default()
    }
}
