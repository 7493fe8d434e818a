//! JSON cache of the merged dataset.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::error::PriceError;
use super::snapshots::write_atomic;
use super::types::CombinedDataset;

/// Default cache location, relative to the working directory.
pub const DEFAULT_CACHE_PATH: &str = "data/prezzi_cache.json";

/// The combined-dataset cache file.
///
/// Freshness is the file's modification time, not anything stored inside it.
#[derive(Debug, Clone)]
pub struct DatasetCache {
    path: PathBuf,
}

impl DatasetCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the cache file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last modification time of the cache file, if it exists.
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        let mtime = std::fs::metadata(&self.path).ok()?.modified().ok()?;
        Some(DateTime::<Utc>::from(mtime))
    }

    /// True when the file exists and was written less than `max_age` ago.
    pub fn is_fresh(&self, max_age: Duration) -> bool {
        let Some(mtime) = std::fs::metadata(&self.path)
            .ok()
            .and_then(|m| m.modified().ok())
        else {
            return false;
        };
        // An mtime in the future counts as age zero.
        let age = SystemTime::now()
            .duration_since(mtime)
            .unwrap_or(Duration::ZERO);
        age < max_age
    }

    /// Read the cache. Missing or unparseable files yield `None`.
    pub fn load(&self) -> Option<CombinedDataset> {
        let contents = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(dataset) => Some(dataset),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring corrupt dataset cache");
                None
            }
        }
    }

    /// The cached dataset, only if it is fresh and non-empty.
    ///
    /// A structurally valid but empty cache means "never populated" and is
    /// never trusted.
    pub fn load_usable(&self, max_age: Duration) -> Option<CombinedDataset> {
        if !self.is_fresh(max_age) {
            debug!(path = %self.path.display(), "dataset cache missing or stale");
            return None;
        }
        let dataset = self.load()?;
        if dataset.is_empty() {
            warn!(path = %self.path.display(), "dataset cache is empty, refetching");
            return None;
        }
        info!(path = %self.path.display(), stations = dataset.len(), "using cached dataset");
        Some(dataset)
    }

    /// Write the dataset, creating parent directories if needed.
    pub fn store(&self, dataset: &CombinedDataset) -> Result<(), PriceError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| PriceError::io(parent, e))?;
        }

        let json = serde_json::to_string(dataset).map_err(|e| PriceError::Cache {
            message: format!("failed to serialize dataset: {e}"),
        })?;
        write_atomic(&self.path, json.as_bytes())?;
        debug!(path = %self.path.display(), stations = dataset.len(), "stored dataset cache");
        Ok(())
    }

    /// Delete the cache file. A missing file is not an error.
    pub fn clear(&self) -> Result<(), PriceError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PriceError::io(&self.path, e)),
        }
    }
}

impl Default for DatasetCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_PATH)
    }
}
