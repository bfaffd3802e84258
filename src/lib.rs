pub mod cli;
pub mod clock;
pub mod config;
pub mod countdown;
pub mod diff;
pub mod error;
pub mod feed;
pub mod filter;
pub mod grouping;
pub mod live;
pub mod model;
pub mod remote;
pub mod storage;
pub mod store;
pub mod sync;
mod worker;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use error::{FeedError, FeedResult, FetchError};
pub use feed::{FeedSettings, LaunchFeed};
pub use model::LaunchRecord;
