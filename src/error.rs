use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by a [`crate::remote::RemoteFetcher`].
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("reading launch page {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("decoding launch page: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("remote unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("launch {id} not found")]
    NotFound { id: String },

    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

pub type FeedResult<T> = Result<T, FeedError>;
