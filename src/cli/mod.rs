use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{ConfigLoader, ConfigPaths};
use crate::storage;

pub mod commands;

use self::commands::{CountdownArgs, ListArgs, RefreshArgs, WatchArgs};

#[derive(Parser, Debug)]
#[command(
    name = "launchfeed",
    version,
    about = "Cached, filtered and date-grouped upcoming launches with live countdowns"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the config file location (takes precedence over LAUNCHFEED_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over LAUNCHFEED_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch the first page of upcoming launches and merge it into the cache
    Refresh(RefreshArgs),
    /// Print cached upcoming launches grouped by date
    List(ListArgs),
    /// Keep the grouped view open and print each incremental update
    Watch(WatchArgs),
    /// Print a live countdown for one cached launch
    Countdown(CountdownArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;

    let loader = match (&cli.config, &cli.data_dir) {
        (None, None) => ConfigLoader::discover()?,
        (config, data_dir) => ConfigLoader::from_paths(overridden_paths(config, data_dir)?),
    };
    let config = loader.load_or_init()?;
    let storage = storage::init(loader.paths(), &config.storage)?;
    tracing::debug!(
        config = %loader.paths().config_file.display(),
        database = %storage.database_path().display(),
        "launchfeed starting"
    );

    match cli.command {
        Commands::Refresh(args) => commands::refresh(&config, storage, args),
        Commands::List(args) => commands::list(&config, &storage, args),
        Commands::Watch(args) => commands::watch(&config, storage, args),
        Commands::Countdown(args) => commands::countdown(&config, storage, args),
    }
}

/// Flags win over the environment; whichever root is not given falls back
/// to discovery.
fn overridden_paths(config: &Option<PathBuf>, data_dir: &Option<PathBuf>) -> Result<ConfigPaths> {
    let discovered = ConfigPaths::discover()?;
    let (config_dir, config_file) = match config {
        Some(file) => {
            let dir = file
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| discovered.config_dir.clone());
            (dir, file.clone())
        }
        None => (discovered.config_dir.clone(), discovered.config_file.clone()),
    };
    let data_dir = data_dir.clone().unwrap_or(discovered.data_dir);
    Ok(ConfigPaths::rooted(config_dir, config_file, data_dir))
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}
