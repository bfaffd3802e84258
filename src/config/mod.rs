use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "LaunchFeed";
const APP_NAME: &str = "launchfeed";

pub const CONFIG_ENV: &str = "LAUNCHFEED_CONFIG";
pub const DATA_ENV: &str = "LAUNCHFEED_DATA";

/// Upstream rejects larger `limit` values on `launch/upcoming`.
pub const MAX_PAGE_SIZE: usize = 100;

const DEFAULT_CONFIG_HEADER: &str = "\
# launchfeed configuration
#
# [feed] page_size: launches requested per refresh (1-100)
# [feed] source_path: saved launch/upcoming page, relative to this file
# [countdown] tick_ms: countdown refresh cadence
# [display] time_zone: \"local\" or \"utc\" for date headers

";

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        Ok(Self::from_paths(ConfigPaths::discover()?))
    }

    pub fn from_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    /// Loads the config file, writing a commented default on first run.
    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if self.paths.config_file.exists() {
            return self.load();
        }
        let mut config = AppConfig::default();
        config.post_load(&self.paths)?;
        self.write_default_config(&config)?;
        tracing::info!(path = %self.paths.config_file.display(), "wrote default config");
        Ok(config)
    }

    pub fn load(&self) -> Result<AppConfig> {
        let path = &self.paths.config_file;
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.post_load(&self.paths)?;
        Ok(config)
    }

    fn write_default_config(&self, config: &AppConfig) -> Result<()> {
        let body = toml::to_string_pretty(config).context("serializing default config")?;
        let path = &self.paths.config_file;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file =
            fs::File::create(path).with_context(|| format!("creating config {}", path.display()))?;
        file.write_all(DEFAULT_CONFIG_HEADER.as_bytes())
            .and_then(|()| file.write_all(body.as_bytes()))
            .with_context(|| format!("writing default config {}", path.display()))?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let override_data = env::var(DATA_ENV).ok().map(PathBuf::from);

        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving XDG project directories")?;

        let config_dir = override_config
            .clone()
            .map(|p| {
                if p.is_dir() {
                    p
                } else {
                    p.parent().map(Path::to_path_buf).unwrap_or(p)
                }
            })
            .unwrap_or_else(|| project_dirs.config_dir().to_path_buf());

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("config.toml"));

        let data_dir = override_data.unwrap_or_else(|| project_dirs.data_dir().to_path_buf());

        Ok(Self::rooted(config_dir, config_file, data_dir))
    }

    /// Paths under explicit roots; the database lives in `data_dir`.
    pub fn rooted(config_dir: PathBuf, config_file: PathBuf, data_dir: PathBuf) -> Self {
        let database_path = data_dir.join("launches.db");
        Self {
            config_dir,
            config_file,
            data_dir,
            database_path,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.data_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub feed: FeedOptions,
    pub storage: StorageOptions,
    pub countdown: CountdownOptions,
    pub display: DisplayOptions,
}

impl AppConfig {
    fn post_load(&mut self, paths: &ConfigPaths) -> Result<()> {
        self.storage
            .resolve(paths)
            .context("resolving storage paths")?;
        if self.feed.page_size == 0 {
            tracing::warn!("feed.page_size of 0 would fetch nothing, using default");
            self.feed.page_size = FeedOptions::default().page_size;
        } else if self.feed.page_size > MAX_PAGE_SIZE {
            tracing::warn!(
                page_size = self.feed.page_size,
                max = MAX_PAGE_SIZE,
                "feed.page_size above upstream limit, clamping"
            );
            self.feed.page_size = MAX_PAGE_SIZE;
        }
        if let Some(source) = self.feed.source_path.take() {
            let source = if source.is_relative() {
                paths.config_dir.join(source)
            } else {
                source
            };
            if !source.exists() {
                tracing::warn!(path = %source.display(), "feed.source_path does not exist yet");
            }
            self.feed.source_path = Some(source);
        }
        if self.countdown.tick_ms == 0 {
            tracing::warn!("countdown.tick_ms of 0 would spin, using default");
            self.countdown.tick_ms = CountdownOptions::default().tick_ms;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedOptions {
    /// Upper bound on launches requested per refresh.
    pub page_size: usize,
    /// Launch page (upstream JSON shape) used by `refresh` when `--source` is omitted.
    pub source_path: Option<PathBuf>,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            source_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    #[serde(skip)]
    pub database_path: PathBuf,
    pub wal_autocheckpoint: u32,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            database_path: PathBuf::new(),
            wal_autocheckpoint: 1000,
        }
    }
}

impl StorageOptions {
    fn resolve(&mut self, paths: &ConfigPaths) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            self.database_path = paths.database_path.clone();
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CountdownOptions {
    pub tick_ms: u64,
}

impl Default for CountdownOptions {
    fn default() -> Self {
        Self { tick_ms: 100 }
    }
}

impl CountdownOptions {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayOptions {
    pub time_zone: TimeZoneSetting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeZoneSetting {
    #[default]
    Local,
    Utc,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_paths(root: &TempDir) -> ConfigPaths {
        let config_dir = root.path().join("config");
        let config_file = config_dir.join("config.toml");
        ConfigPaths::rooted(config_dir, config_file, root.path().join("data"))
    }

    #[test]
    fn first_load_writes_defaults() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let paths = temp_paths(&temp);
        let loader = ConfigLoader::from_paths(paths.clone());

        let cfg = loader.load_or_init()?;
        assert!(paths.config_file.exists());
        assert_eq!(cfg.feed.page_size, 100);
        assert_eq!(cfg.countdown.tick_interval(), Duration::from_millis(100));
        assert_eq!(cfg.storage.database_path, paths.database_path);
        assert_eq!(cfg.display.time_zone, TimeZoneSetting::Local);

        let reloaded = loader.load()?;
        assert_eq!(reloaded.feed.page_size, 100);
        Ok(())
    }

    #[test]
    fn partial_config_keeps_defaults_and_rejects_zero_values() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let paths = temp_paths(&temp);
        paths.ensure_directories()?;
        fs::write(
            &paths.config_file,
            "[feed]\npage_size = 0\n\n[countdown]\ntick_ms = 250\n\n[display]\ntime_zone = \"utc\"\n",
        )?;

        let cfg = ConfigLoader::from_paths(paths).load()?;
        assert_eq!(cfg.feed.page_size, 100);
        assert_eq!(cfg.countdown.tick_ms, 250);
        assert_eq!(cfg.display.time_zone, TimeZoneSetting::Utc);
        assert_eq!(cfg.storage.wal_autocheckpoint, 1000);
        Ok(())
    }

    #[test]
    fn page_size_is_clamped_and_source_resolved_against_config_dir() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let paths = temp_paths(&temp);
        paths.ensure_directories()?;
        fs::write(
            &paths.config_file,
            "[feed]\npage_size = 250\nsource_path = \"pages/upcoming.json\"\n",
        )?;

        let cfg = ConfigLoader::from_paths(paths.clone()).load()?;
        assert_eq!(cfg.feed.page_size, MAX_PAGE_SIZE);
        assert_eq!(
            cfg.feed.source_path,
            Some(paths.config_dir.join("pages/upcoming.json"))
        );
        Ok(())
    }

    #[test]
    fn default_config_file_is_commented_and_reloadable() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let paths = temp_paths(&temp);
        ConfigLoader::from_paths(paths.clone()).load_or_init()?;

        let written = fs::read_to_string(&paths.config_file)?;
        assert!(written.starts_with("# launchfeed configuration"));
        assert!(written.contains("[countdown]"));
        let cfg = ConfigLoader::from_paths(paths).load()?;
        assert_eq!(cfg.countdown.tick_ms, 100);
        assert!(cfg.feed.source_path.is_none());
        Ok(())
    }
}
