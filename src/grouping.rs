use std::sync::Arc;

use anyhow::Result;
use crossbeam_channel::select;
use chrono::{Local, TimeZone};
use indexmap::IndexMap;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use crate::live::{LiveValue, Subscription};
use crate::model::LaunchRecord;
use crate::worker::Worker;

pub trait DateFormatter: Send + Sync {
    /// Bucket label for `at`, e.g. `Mar 1, 2021`.
    fn medium_date(&self, at: OffsetDateTime) -> String;
}

/// Offset rules of a time zone, looked up per instant so that dates on
/// either side of a daylight-saving change land on the right calendar day.
pub trait ZoneRules: Send + Sync {
    fn offset_at(&self, at: OffsetDateTime) -> UtcOffset;
}

impl ZoneRules for UtcOffset {
    fn offset_at(&self, _at: OffsetDateTime) -> UtcOffset {
        *self
    }
}

/// The device's zone, as the platform's tz database reports it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalZone;

impl ZoneRules for LocalZone {
    fn offset_at(&self, at: OffsetDateTime) -> UtcOffset {
        let Some(utc) = chrono::DateTime::from_timestamp(at.unix_timestamp(), 0) else {
            return UtcOffset::UTC;
        };
        let seconds = Local
            .offset_from_utc_datetime(&utc.naive_utc())
            .local_minus_utc();
        UtcOffset::from_whole_seconds(seconds).unwrap_or_else(|err| {
            tracing::warn!(?err, seconds, "local offset out of range, using UTC");
            UtcOffset::UTC
        })
    }
}

/// English medium-style dates rendered in a time zone.
#[derive(Clone)]
pub struct MediumDateFormatter {
    zone: Arc<dyn ZoneRules>,
}

impl MediumDateFormatter {
    pub fn new(zone: impl ZoneRules + 'static) -> Self {
        Self {
            zone: Arc::new(zone),
        }
    }

    pub fn utc() -> Self {
        Self::new(UtcOffset::UTC)
    }

    pub fn local() -> Self {
        Self::new(LocalZone)
    }
}

impl DateFormatter for MediumDateFormatter {
    fn medium_date(&self, at: OffsetDateTime) -> String {
        let local = at.to_offset(self.zone.offset_at(at));
        local
            .format(format_description!("[month repr:short] [day padding:none], [year]"))
            .unwrap_or_else(|_| local.date().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateBucket {
    pub label: String,
    pub launches: Vec<LaunchRecord>,
}

/// Splits `launches` into date buckets.
///
/// Buckets appear in the order their label is first seen, and launches keep
/// their input order inside a bucket. Nothing is re-sorted.
pub fn group_by_date(launches: &[LaunchRecord], formatter: &dyn DateFormatter) -> Vec<DateBucket> {
    let mut buckets: IndexMap<String, Vec<LaunchRecord>> = IndexMap::new();
    for launch in launches {
        buckets
            .entry(formatter.medium_date(launch.net))
            .or_default()
            .push(launch.clone());
    }
    buckets
        .into_iter()
        .map(|(label, launches)| DateBucket { label, launches })
        .collect()
}

/// One line of the flattened grouped view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedRow {
    Header(String),
    Launch(LaunchRecord),
}

pub fn flatten(buckets: &[DateBucket]) -> Vec<FeedRow> {
    let mut rows = Vec::with_capacity(buckets.iter().map(|b| b.launches.len() + 1).sum());
    for bucket in buckets {
        rows.push(FeedRow::Header(bucket.label.clone()));
        rows.extend(bucket.launches.iter().cloned().map(FeedRow::Launch));
    }
    rows
}

/// Regroups the filtered list off the caller's thread.
pub struct GroupingStage {
    output: LiveValue<Vec<DateBucket>>,
    _worker: Worker,
}

impl GroupingStage {
    pub fn spawn(
        filtered: Subscription<Vec<LaunchRecord>>,
        formatter: Arc<dyn DateFormatter>,
    ) -> Result<Self> {
        let output = LiveValue::new(Vec::new());
        let publisher = output.clone();
        let worker = Worker::spawn("launch-grouping", move |shutdown| {
            'events: loop {
                let launches = select! {
                    recv(shutdown) -> _ => break 'events,
                    recv(filtered.receiver()) -> msg => match msg {
                        Ok(value) => value,
                        Err(_) => break 'events,
                    },
                };
                let launches = filtered.try_latest().unwrap_or(launches);
                let grouped = group_by_date(&launches, formatter.as_ref());
                let buckets = grouped.len();
                if publisher.publish_if_changed(grouped) {
                    tracing::debug!(buckets, launches = launches.len(), "regrouped launches");
                }
            }
        })?;
        Ok(Self {
            output,
            _worker: worker,
        })
    }

    pub fn subscribe(&self) -> Subscription<Vec<DateBucket>> {
        self.output.subscribe()
    }

    pub fn latest(&self) -> Vec<DateBucket> {
        self.output.latest().unwrap_or_default()
    }
}
