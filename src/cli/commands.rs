use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use crossbeam_channel::select;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::config::AppConfig;
use crate::countdown::CountdownTicker;
use crate::diff::{DiffOp, FeedUpdate};
use crate::error::FetchError;
use crate::feed::{FeedSettings, LaunchFeed};
use crate::filter;
use crate::grouping::{group_by_date, DateBucket, DateFormatter, FeedRow};
use crate::model::{LaunchRecord, UpcomingPage};
use crate::remote::{JsonFileFetcher, RemoteFetcher, UpcomingQuery};
use crate::storage::StorageHandle;
use crate::store::LaunchStore;
use crate::sync::{RefreshOutcome, SyncCoordinator};

#[derive(Args, Debug, Clone)]
pub struct RefreshArgs {
    /// Launch page to merge (defaults to feed.source_path)
    #[arg(long)]
    pub source: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Only show launches whose mission name contains this keyword
    #[arg(long)]
    pub filter: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Launch page to refresh from once the view is up
    #[arg(long)]
    pub source: Option<PathBuf>,
    /// Mission keyword filter
    #[arg(long)]
    pub filter: Option<String>,
    /// How long to keep watching
    #[arg(long, default_value_t = 10)]
    pub seconds: u64,
}

#[derive(Args, Debug, Clone)]
pub struct CountdownArgs {
    /// Launch identifier
    pub id: String,
    /// How long to keep counting
    #[arg(long, default_value_t = 5)]
    pub seconds: u64,
}

/// Stands in when no launch page is configured; every fetch fails.
struct NoSource;

impl RemoteFetcher for NoSource {
    fn fetch_upcoming(&self, _query: &UpcomingQuery) -> Result<UpcomingPage, FetchError> {
        Err(FetchError::Unavailable("no launch source configured".into()))
    }
}

pub fn refresh(config: &AppConfig, storage: StorageHandle, args: RefreshArgs) -> Result<()> {
    let source = args
        .source
        .or_else(|| config.feed.source_path.clone())
        .context("no launch source: pass --source or set feed.source_path")?;
    let store = Arc::new(LaunchStore::open(storage)?);
    let output = run_refresh(store, JsonFileFetcher::new(source), config.feed.page_size)?;
    print!("{output}");
    Ok(())
}

fn run_refresh(
    store: Arc<LaunchStore>,
    fetcher: JsonFileFetcher,
    page_size: usize,
) -> Result<String> {
    let source = fetcher.path().to_path_buf();
    tracing::debug!(
        source = %source.display(),
        database = %store.storage().database_path().display(),
        "refreshing launch cache"
    );
    let sync = SyncCoordinator::new(Arc::clone(&store), Arc::new(fetcher), page_size);
    match sync.refresh() {
        RefreshOutcome::Merged { count } => {
            let total = store.storage().count_launches()?;
            Ok(format!("Merged {count} launches from {} ({total} cached)\n", source.display()))
        }
        RefreshOutcome::Failed => {
            let message = sync.current().last_error.unwrap_or_default();
            bail!("{message} while refreshing from {}", source.display())
        }
        RefreshOutcome::Skipped => Ok("Refresh already in progress.\n".to_string()),
    }
}

pub fn list(config: &AppConfig, storage: &StorageHandle, args: ListArgs) -> Result<()> {
    let settings = FeedSettings::from_config(config);
    let output = run_list(
        storage,
        args.filter.as_deref().unwrap_or_default(),
        settings.clock.now(),
        settings.formatter.as_ref(),
    )?;
    print!("{output}");
    Ok(())
}

fn run_list(
    storage: &StorageHandle,
    keyword: &str,
    now: OffsetDateTime,
    formatter: &dyn DateFormatter,
) -> Result<String> {
    let launches = storage.fetch_launches().context("reading cached launches")?;
    let visible = filter::apply(&launches, keyword, now);
    Ok(format_grouped(&group_by_date(&visible, formatter)))
}

pub fn watch(config: &AppConfig, storage: StorageHandle, args: WatchArgs) -> Result<()> {
    let source = args.source.or_else(|| config.feed.source_path.clone());
    let fetcher: Arc<dyn RemoteFetcher> = match &source {
        Some(path) => Arc::new(JsonFileFetcher::new(path)),
        None => Arc::new(NoSource),
    };
    let feed = LaunchFeed::open(storage, fetcher, FeedSettings::from_config(config))?;
    if let Some(keyword) = args.filter {
        feed.set_filter(keyword);
    }
    let updates = feed.updates();
    let sync = feed.sync_state();
    if source.is_some() {
        feed.refresh_in_background();
    }

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    'watch: loop {
        let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
            break 'watch;
        };
        select! {
            recv(updates.receiver()) -> msg => match msg {
                Ok(update) => print!("{}", format_update(&update)),
                Err(_) => break 'watch,
            },
            recv(sync.receiver()) -> msg => match msg {
                Ok(state) => {
                    if let Some(error) = &state.last_error {
                        eprintln!("{error}");
                        feed.dismiss_error();
                    }
                }
                Err(_) => break 'watch,
            },
            default(remaining) => break 'watch,
        }
    }
    Ok(())
}

pub fn countdown(config: &AppConfig, storage: StorageHandle, args: CountdownArgs) -> Result<()> {
    let settings = FeedSettings::from_config(config);
    let store = LaunchStore::open(storage)?;
    let launch = store
        .by_id(&args.id)?
        .ok_or_else(|| anyhow!("launch {} not found", args.id))?;
    println!("{}  NET {}", launch.name, format_net(launch.net));

    let mut ticker = CountdownTicker::new(settings.clock, settings.tick_interval);
    let ticks = ticker.ticks();
    ticker.select(launch);

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    let mut last_printed = String::new();
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        let Some(text) = ticks.recv_timeout(remaining) else {
            break;
        };
        if text != last_printed {
            println!("{text}");
            last_printed = text;
        }
    }
    ticker.cancel();
    Ok(())
}

fn format_grouped(buckets: &[DateBucket]) -> String {
    if buckets.is_empty() {
        return "No upcoming launches.\n".to_string();
    }
    let mut out = String::new();
    for bucket in buckets {
        let _ = writeln!(&mut out, "{}", bucket.label);
        for launch in &bucket.launches {
            let _ = writeln!(&mut out, "{}", format_launch_line(launch));
        }
        out.push('\n');
    }
    out
}

fn format_launch_line(launch: &LaunchRecord) -> String {
    let mut line = format!("  {}  {}", format_net(launch.net), launch.name);
    if let Some(mission) = launch.mission_name() {
        let _ = write!(&mut line, "  [{mission}]");
    }
    let _ = write!(&mut line, "  ({})", launch.id);
    line
}

fn format_update(update: &FeedUpdate) -> String {
    let (mut inserted, mut removed, mut moved, mut changed) = (0, 0, 0, 0);
    for op in &update.ops {
        match op {
            DiffOp::Insert { .. } => inserted += 1,
            DiffOp::Remove { .. } => removed += 1,
            DiffOp::Move { .. } => moved += 1,
            DiffOp::Change { .. } => changed += 1,
        }
    }
    let mut out = format!(
        "-- {} rows: +{inserted} -{removed} ~{moved} *{changed}\n",
        update.rows.len()
    );
    for row in &update.rows {
        let _ = match row {
            FeedRow::Header(label) => writeln!(&mut out, "{label}"),
            FeedRow::Launch(launch) => writeln!(&mut out, "{}", format_launch_line(launch)),
        };
    }
    out
}

fn format_net(net: OffsetDateTime) -> String {
    net.format(&Rfc3339)
        .unwrap_or_else(|_| net.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouping::MediumDateFormatter;
    use crate::model::fixtures::launch;
    use crate::storage::test_support::init_storage;
    use std::fs;
    use time::macros::datetime;

    type TestResult<T = ()> = Result<T>;

    #[test]
    fn cli_list_groups_visible_launches_by_date() -> TestResult {
        let (_temp, storage) = init_storage()?;
        storage.upsert_launches(&[
            launch("past", datetime!(2021-02-27 00:00 UTC), Some("nasa")),
            launch("c", datetime!(2021-03-01 00:00 UTC), Some("nasa")),
            launch("b", datetime!(2021-03-07 00:00 UTC), Some("spx")),
            launch("d", datetime!(2021-03-08 00:00 UTC), Some("nasa")),
        ])?;

        let output = run_list(
            &storage,
            "nasa",
            datetime!(2021-02-28 00:00:01 UTC),
            &MediumDateFormatter::utc(),
        )?;
        assert!(output.starts_with("Mar 1, 2021\n"));
        assert!(output.contains("Mar 8, 2021\n"));
        assert!(output.contains("(c)"));
        assert!(!output.contains("(past)"));
        assert!(!output.contains("(b)"));
        Ok(())
    }

    #[test]
    fn cli_list_reports_empty_view() -> TestResult {
        let (_temp, storage) = init_storage()?;
        let output = run_list(
            &storage,
            "",
            datetime!(2021-02-28 00:00 UTC),
            &MediumDateFormatter::utc(),
        )?;
        assert_eq!(output, "No upcoming launches.\n");
        Ok(())
    }

    #[test]
    fn cli_refresh_merges_page_from_file() -> TestResult {
        let (temp, storage) = init_storage()?;
        let page = UpcomingPage {
            count: 1,
            results: vec![launch("n1", datetime!(2021-03-01 00:00 UTC), Some("new"))],
        };
        let source = temp.path().join("upcoming.json");
        fs::write(&source, serde_json::to_vec(&page)?)?;

        let store = Arc::new(LaunchStore::open(storage)?);
        let output = run_refresh(Arc::clone(&store), JsonFileFetcher::new(&source), 100)?;
        assert!(output.starts_with("Merged 1 launches"));
        assert!(output.contains("(1 cached)"));
        assert!(store.by_id("n1")?.is_some());

        let broken = run_refresh(store, JsonFileFetcher::new(temp.path().join("missing.json")), 100);
        let message = format!("{:#}", broken.err().unwrap_or_else(|| anyhow!("expected failure")));
        assert!(message.starts_with("Network Error"));
        Ok(())
    }

    #[test]
    fn update_summary_counts_each_op_kind() {
        let a = launch("a", datetime!(2021-03-01 00:00 UTC), Some("spx"));
        let update = FeedUpdate {
            rows: vec![FeedRow::Header("Mar 1, 2021".into()), FeedRow::Launch(a)],
            ops: vec![
                DiffOp::Insert { new_index: 0 },
                DiffOp::Insert { new_index: 1 },
                DiffOp::Remove { old_index: 0 },
            ],
        };
        let out = format_update(&update);
        assert!(out.starts_with("-- 2 rows: +2 -1 ~0 *0\n"));
        assert!(out.contains("Launch a  [spx]  (a)"));
    }
}
