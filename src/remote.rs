use std::fs;
use std::path::{Path, PathBuf};

use strum::{Display, EnumString};

use crate::error::FetchError;
use crate::model::{LaunchRecord, UpcomingPage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
pub enum LaunchOrdering {
    #[default]
    #[strum(serialize = "net")]
    NetAscending,
    #[strum(serialize = "-net")]
    NetDescending,
}

/// Parameters of one `launch/upcoming` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpcomingQuery {
    pub limit: usize,
    pub offset: usize,
    pub ordering: LaunchOrdering,
    pub search: Option<String>,
}

impl UpcomingQuery {
    /// The only query a refresh ever issues: first page, soonest first, no
    /// server-side search.
    pub fn first_page(limit: usize) -> Self {
        Self {
            limit,
            offset: 0,
            ordering: LaunchOrdering::NetAscending,
            search: None,
        }
    }
}

pub trait RemoteFetcher: Send + Sync {
    fn fetch_upcoming(&self, query: &UpcomingQuery) -> Result<UpcomingPage, FetchError>;
}

/// Serves pages from a saved `launch/upcoming` response.
#[derive(Debug, Clone)]
pub struct JsonFileFetcher {
    path: PathBuf,
}

impl JsonFileFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RemoteFetcher for JsonFileFetcher {
    fn fetch_upcoming(&self, query: &UpcomingQuery) -> Result<UpcomingPage, FetchError> {
        let raw = fs::read(&self.path).map_err(|source| FetchError::Io {
            path: self.path.clone(),
            source,
        })?;
        let page: UpcomingPage = serde_json::from_slice(&raw)?;
        tracing::debug!(
            path = %self.path.display(),
            available = page.results.len(),
            ordering = %query.ordering,
            "read launch page"
        );
        Ok(select_page(page.results, query))
    }
}

fn select_page(mut launches: Vec<LaunchRecord>, query: &UpcomingQuery) -> UpcomingPage {
    if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
        let needle = search.to_lowercase();
        launches.retain(|launch| launch.name.to_lowercase().contains(&needle));
    }
    match query.ordering {
        LaunchOrdering::NetAscending => launches.sort_by(|a, b| a.net.cmp(&b.net)),
        LaunchOrdering::NetDescending => launches.sort_by(|a, b| b.net.cmp(&a.net)),
    }
    let count = launches.len();
    let results = launches
        .into_iter()
        .skip(query.offset)
        .take(query.limit)
        .collect();
    UpcomingPage { count, results }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::launch;
    use assert_matches::assert_matches;
    use std::str::FromStr;
    use tempfile::TempDir;
    use time::macros::datetime;

    #[test]
    fn ordering_uses_api_names() {
        assert_eq!(LaunchOrdering::NetAscending.to_string(), "net");
        assert_eq!(
            LaunchOrdering::from_str("-net").ok(),
            Some(LaunchOrdering::NetDescending)
        );
    }

    #[test]
    fn file_fetcher_sorts_and_bounds_page() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("upcoming.json");
        let page = UpcomingPage {
            count: 3,
            results: vec![
                launch("late", datetime!(2021-03-09 00:00 UTC), Some("c")),
                launch("early", datetime!(2021-03-01 00:00 UTC), Some("a")),
                launch("mid", datetime!(2021-03-05 00:00 UTC), Some("b")),
            ],
        };
        fs::write(&path, serde_json::to_vec(&page)?)?;

        let fetcher = JsonFileFetcher::new(&path);
        let fetched = fetcher.fetch_upcoming(&UpcomingQuery::first_page(2))?;
        assert_eq!(fetched.count, 3);
        let ids: Vec<_> = fetched.results.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "mid"]);
        Ok(())
    }

    #[test]
    fn file_fetcher_reports_missing_and_malformed_pages() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let missing = JsonFileFetcher::new(temp.path().join("absent.json"));
        assert_matches!(
            missing.fetch_upcoming(&UpcomingQuery::first_page(10)),
            Err(FetchError::Io { .. })
        );

        let garbage = temp.path().join("garbage.json");
        fs::write(&garbage, b"{\"count\": \"many\"}")?;
        assert_matches!(
            JsonFileFetcher::new(garbage).fetch_upcoming(&UpcomingQuery::first_page(10)),
            Err(FetchError::Decode(_))
        );
        Ok(())
    }
}
