use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use parking_lot::Mutex;
use time::OffsetDateTime;

use crate::clock::SharedClock;
use crate::error::{FeedError, FeedResult};
use crate::live::{LiveValue, Subscription};
use crate::model::LaunchRecord;
use crate::store::LaunchStore;
use crate::worker::Worker;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

const SECONDS_PER_MINUTE: i64 = 60;
const SECONDS_PER_HOUR: i64 = 60 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: i64 = 24 * SECONDS_PER_HOUR;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountdownParts {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

/// Time left until `net`, clamped at zero. Sub-second remainders are dropped.
pub fn countdown_parts(now: OffsetDateTime, net: OffsetDateTime) -> CountdownParts {
    if net <= now {
        return CountdownParts::default();
    }
    let total = (net - now).whole_seconds();
    CountdownParts {
        days: total / SECONDS_PER_DAY,
        hours: total % SECONDS_PER_DAY / SECONDS_PER_HOUR,
        minutes: total % SECONDS_PER_HOUR / SECONDS_PER_MINUTE,
        seconds: total % SECONDS_PER_MINUTE,
    }
}

pub fn format_countdown(parts: CountdownParts) -> String {
    format!(
        "T-{:02}:{:02}:{:02}:{:02}",
        parts.days, parts.hours, parts.minutes, parts.seconds
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickerState {
    Idle,
    Active { launch_id: String },
    Cancelled,
}

/// Live `T-dd:hh:mm:ss` text for one selected launch.
///
/// Selecting a different record tears down the running tick thread and
/// starts a fresh one. Every tick emits, even when the text is unchanged.
/// Once a consumer has subscribed through [`ticks`](Self::ticks), dropping
/// the last subscription cancels the ticker just like
/// [`cancel`](Self::cancel); after that it stays silent for good.
pub struct CountdownTicker {
    clock: SharedClock,
    interval: Duration,
    output: LiveValue<String>,
    state: Arc<Mutex<TickerState>>,
    watched: Arc<AtomicBool>,
    current: Option<LaunchRecord>,
    running: Option<Worker>,
}

impl fmt::Debug for CountdownTicker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountdownTicker")
            .field("interval", &self.interval)
            .field("state", &*self.state.lock())
            .field("running", &self.running.is_some())
            .finish()
    }
}

impl CountdownTicker {
    pub fn new(clock: SharedClock, interval: Duration) -> Self {
        Self {
            clock,
            interval,
            output: LiveValue::empty(),
            state: Arc::new(Mutex::new(TickerState::Idle)),
            watched: Arc::new(AtomicBool::new(false)),
            current: None,
            running: None,
        }
    }

    pub fn select(&mut self, launch: LaunchRecord) {
        if self.is_cancelled() {
            tracing::debug!(launch_id = %launch.id, "ticker cancelled, ignoring selection");
            return;
        }
        if self.current.as_ref() == Some(&launch) {
            return;
        }
        self.stop_ticking();
        // The old tick thread may have cancelled on its way out.
        if self.is_cancelled() {
            return;
        }

        let launch_id = launch.id.clone();
        let net = launch.net;
        let clock = self.clock.clone();
        let interval = self.interval;
        let publisher = self.output.clone();
        let state = Arc::clone(&self.state);
        let watched = Arc::clone(&self.watched);
        let thread_launch_id = launch_id.clone();
        let spawned = Worker::spawn("launch-countdown", move |shutdown| loop {
            if watched.load(Ordering::Acquire) && publisher.subscriber_count() == 0 {
                tracing::debug!(launch_id = %thread_launch_id, "countdown unsubscribed");
                publisher.clear();
                *state.lock() = TickerState::Cancelled;
                break;
            }
            publisher.publish(format_countdown(countdown_parts(clock.now(), net)));
            match shutdown.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                _ => break,
            }
        });
        match spawned {
            Ok(worker) => {
                tracing::debug!(%launch_id, "countdown started");
                self.running = Some(worker);
                self.current = Some(launch);
                *self.state.lock() = TickerState::Active { launch_id };
            }
            Err(err) => {
                tracing::error!(error = %err, %launch_id, "countdown could not start");
                *self.state.lock() = TickerState::Idle;
            }
        }
    }

    /// Looks the launch up in `store` and selects it.
    pub fn select_by_id(&mut self, store: &LaunchStore, id: &str) -> FeedResult<()> {
        let launch = store
            .by_id(id)?
            .ok_or_else(|| FeedError::NotFound { id: id.to_string() })?;
        self.select(launch);
        Ok(())
    }

    pub fn clear(&mut self) {
        if self.is_cancelled() {
            return;
        }
        self.stop_ticking();
        self.output.clear();
        *self.state.lock() = TickerState::Idle;
    }

    /// Stops ticking. The tick thread has exited by the time this returns,
    /// and later subscribers get no replay.
    pub fn cancel(&mut self) {
        self.stop_ticking();
        self.output.clear();
        *self.state.lock() = TickerState::Cancelled;
    }

    pub fn ticks(&self) -> Subscription<String> {
        let subscription = self.output.subscribe();
        self.watched.store(true, Ordering::Release);
        subscription
    }

    pub fn state(&self) -> TickerState {
        self.state.lock().clone()
    }

    fn is_cancelled(&self) -> bool {
        *self.state.lock() == TickerState::Cancelled
    }

    fn stop_ticking(&mut self) {
        self.current = None;
        if let Some(mut worker) = self.running.take() {
            worker.stop();
        }
    }
}

impl Drop for CountdownTicker {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::fixtures::launch;
    use crate::storage::test_support::init_storage;
    use assert_matches::assert_matches;
    use std::time::Instant;
    use time::macros::datetime;

    const FAST: Duration = Duration::from_millis(5);
    const WAIT: Duration = Duration::from_secs(5);

    fn reaches_state(ticker: &CountdownTicker, wanted: &TickerState) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if &ticker.state() == wanted {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn parts_break_down_remaining_time() {
        let now = datetime!(2021-02-28 00:00 UTC);
        let net = now + time::Duration::days(2)
            + time::Duration::hours(5)
            + time::Duration::minutes(9)
            + time::Duration::seconds(41)
            + time::Duration::milliseconds(999);
        let parts = countdown_parts(now, net);
        assert_eq!(
            parts,
            CountdownParts {
                days: 2,
                hours: 5,
                minutes: 9,
                seconds: 41
            }
        );
        assert_eq!(format_countdown(parts), "T-02:05:09:41");
    }

    #[test]
    fn past_or_current_net_is_all_zero() {
        let now = datetime!(2021-02-28 00:00 UTC);
        assert_eq!(countdown_parts(now, now), CountdownParts::default());
        assert_eq!(
            format_countdown(countdown_parts(now, datetime!(2021-02-27 00:00 UTC))),
            "T-00:00:00:00"
        );
        assert_eq!(
            format_countdown(CountdownParts {
                days: 123,
                ..CountdownParts::default()
            }),
            "T-123:00:00:00"
        );
    }

    #[test]
    fn ticker_emits_on_every_tick() {
        let now = datetime!(2021-02-28 00:00 UTC);
        let clock = ManualClock::new(now);
        let mut ticker = CountdownTicker::new(Arc::new(clock), FAST);
        let ticks = ticker.ticks();
        assert_eq!(ticker.state(), TickerState::Idle);

        ticker.select(launch("gone", datetime!(2021-02-27 00:00 UTC), Some("past")));
        assert_matches!(ticker.state(), TickerState::Active { launch_id } if launch_id == "gone");
        for _ in 0..3 {
            assert_eq!(ticks.recv_timeout(WAIT).as_deref(), Some("T-00:00:00:00"));
        }
    }

    #[test]
    fn ticker_reads_clock_fresh_each_tick() {
        let now = datetime!(2021-02-28 00:00 UTC);
        let clock = ManualClock::new(now);
        let mut ticker = CountdownTicker::new(Arc::new(clock.clone()), FAST);
        let ticks = ticker.ticks();
        ticker.select(launch("a", now + time::Duration::minutes(1), Some("a")));
        assert!(ticks.wait_until(WAIT, |t| t == "T-00:00:01:00").is_some());

        clock.advance(time::Duration::seconds(15));
        assert!(ticks.wait_until(WAIT, |t| t == "T-00:00:00:45").is_some());
    }

    #[test]
    fn selecting_another_launch_restarts() {
        let now = datetime!(2021-02-28 00:00 UTC);
        let mut ticker = CountdownTicker::new(Arc::new(ManualClock::new(now)), FAST);
        let ticks = ticker.ticks();

        ticker.select(launch("a", now + time::Duration::days(1), Some("a")));
        assert!(ticks.wait_until(WAIT, |t| t == "T-01:00:00:00").is_some());

        ticker.select(launch("b", now + time::Duration::days(2), Some("b")));
        assert_matches!(ticker.state(), TickerState::Active { launch_id } if launch_id == "b");
        assert!(ticks.wait_until(WAIT, |t| t == "T-02:00:00:00").is_some());
        // The old thread has been joined, so nothing from "a" can follow.
        let _ = ticks.try_latest();
        assert!(ticks.wait_until(Duration::from_millis(50), |t| t != "T-02:00:00:00").is_none());
    }

    #[test]
    fn cancel_stops_emissions_for_good() {
        let now = datetime!(2021-02-28 00:00 UTC);
        let mut ticker = CountdownTicker::new(Arc::new(ManualClock::new(now)), FAST);
        let ticks = ticker.ticks();
        ticker.select(launch("a", now + time::Duration::hours(1), Some("a")));
        assert!(ticks.recv_timeout(WAIT).is_some());

        ticker.cancel();
        let _ = ticks.try_latest();
        assert_eq!(ticks.recv_timeout(Duration::from_millis(50)), None);
        assert_eq!(ticker.state(), TickerState::Cancelled);

        ticker.select(launch("b", now + time::Duration::hours(2), Some("b")));
        assert_eq!(ticker.state(), TickerState::Cancelled);
        assert_eq!(ticks.recv_timeout(Duration::from_millis(50)), None);
    }

    #[test]
    fn clear_returns_to_idle() {
        let now = datetime!(2021-02-28 00:00 UTC);
        let mut ticker = CountdownTicker::new(Arc::new(ManualClock::new(now)), FAST);
        let ticks = ticker.ticks();
        ticker.select(launch("a", now + time::Duration::hours(1), Some("a")));
        assert!(ticks.recv_timeout(WAIT).is_some());

        ticker.clear();
        assert_eq!(ticker.state(), TickerState::Idle);
        let _ = ticks.try_latest();
        assert_eq!(ticks.recv_timeout(Duration::from_millis(50)), None);
    }

    #[test]
    fn select_by_id_reports_unknown_launch() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let store = LaunchStore::open(storage)?;
        let now = datetime!(2021-02-28 00:00 UTC);
        store.upsert_all(&[launch("known", now + time::Duration::hours(3), Some("k"))])?;

        let mut ticker = CountdownTicker::new(Arc::new(ManualClock::new(now)), FAST);
        assert_matches!(
            ticker.select_by_id(&store, "missing"),
            Err(FeedError::NotFound { id }) if id == "missing"
        );
        assert_eq!(ticker.state(), TickerState::Idle);

        ticker.select_by_id(&store, "known")?;
        assert!(ticker.ticks().wait_until(WAIT, |t| t == "T-00:03:00:00").is_some());
        Ok(())
    }

    #[test]
    fn dropping_last_subscription_cancels_ticker() {
        let now = datetime!(2021-02-28 00:00 UTC);
        let clock = ManualClock::new(now);
        let mut ticker = CountdownTicker::new(Arc::new(clock.clone()), FAST);
        ticker.select(launch("a", now + time::Duration::hours(1), Some("a")));
        let ticks = ticker.ticks();
        assert_eq!(ticks.recv_timeout(WAIT).as_deref(), Some("T-00:01:00:00"));

        drop(ticks);
        assert!(reaches_state(&ticker, &TickerState::Cancelled));
        clock.advance(time::Duration::minutes(10));
        let late = ticker.ticks();
        assert_eq!(late.recv_timeout(Duration::from_millis(50)), None);

        ticker.select(launch("b", now + time::Duration::hours(2), Some("b")));
        assert_eq!(ticker.state(), TickerState::Cancelled);
    }

    #[test]
    fn unwatched_ticker_keeps_running_until_first_subscriber() {
        let now = datetime!(2021-02-28 00:00 UTC);
        let mut ticker = CountdownTicker::new(Arc::new(ManualClock::new(now)), FAST);
        ticker.select(launch("a", now + time::Duration::hours(1), Some("a")));
        std::thread::sleep(Duration::from_millis(30));
        assert_matches!(ticker.state(), TickerState::Active { .. });
        let ticks = ticker.ticks();
        assert_eq!(ticks.try_recv().as_deref(), Some("T-00:01:00:00"));
    }

    #[test]
    fn cancel_and_clear_leave_nothing_to_replay() {
        let now = datetime!(2021-02-28 00:00 UTC);
        let mut ticker = CountdownTicker::new(Arc::new(ManualClock::new(now)), FAST);
        let ticks = ticker.ticks();

        ticker.select(launch("a", now + time::Duration::minutes(50), Some("a")));
        assert!(ticks.recv_timeout(WAIT).is_some());
        ticker.clear();
        assert_eq!(ticker.ticks().try_recv(), None);

        ticker.select(launch("b", now + time::Duration::minutes(50), Some("b")));
        assert!(ticks.wait_until(WAIT, |t| t == "T-00:00:50:00").is_some());
        ticker.cancel();
        assert_eq!(ticker.ticks().try_recv(), None);
        assert_eq!(ticker.state(), TickerState::Cancelled);
    }
}
