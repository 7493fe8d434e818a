//! Price pipeline error types.

use std::path::PathBuf;
use std::time::Duration;

/// Errors from acquiring, caching, or persisting price data.
///
/// Row-level parse problems never surface here: bad rows are skipped and
/// counted by the parser instead.
#[derive(Debug, thiserror::Error)]
pub enum PriceError {
    /// Network-level failure (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream is throttling us (HTTP 429 or 509).
    #[error("rate limited by {url} (status {status})")]
    RateLimited {
        url: String,
        status: u16,
        retry_after: Option<Duration>,
    },

    /// Upstream answered with another non-success status.
    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    /// Filesystem operation failed.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No candidate directory holds a complete CSV pair.
    #[error("local CSV files not found in candidate dirs: {}", format_dirs(.searched))]
    LocalNotFound { searched: Vec<PathBuf> },

    /// Cache serialization failed.
    #[error("cache error: {message}")]
    Cache { message: String },

    /// A blocking worker panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl PriceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PriceError::Io {
            path: path.into(),
            source,
        }
    }
}

fn format_dirs(dirs: &[PathBuf]) -> String {
    dirs.iter()
        .map(|d| d.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
