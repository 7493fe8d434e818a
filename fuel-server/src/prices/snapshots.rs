//! Raw CSV snapshots on local disk.
//!
//! Every successful remote fetch is saved as a timestamped pair
//! (`<dataset>_<YYYYMMDD_HHMMSS>.csv`) in the preferred local directory, and
//! only the newest few pairs are kept. The same directories are searched,
//! in order, when the remote source is unavailable.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, info, warn};

use super::error::PriceError;
use super::format::{decode_latin1, encode_latin1};

/// Dataset name of the station registry file.
pub const REGISTRY_DATASET: &str = "anagrafica_impianti_attivi";

/// Dataset name of the price list file.
pub const PRICES_DATASET: &str = "prezzo_alle_8";

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const PART_SUFFIX: &str = ".part";
const WRITE_CHECK_FILE: &str = ".write_check";

/// Write `bytes` to `path` via a uniquely named sibling and a rename, so
/// readers never see a partial file even with concurrent writers.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PriceError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut staged = tempfile::Builder::new()
        .prefix(".")
        .suffix(PART_SUFFIX)
        .tempfile_in(dir)
        .map_err(|e| PriceError::io(dir, e))?;
    staged
        .write_all(bytes)
        .map_err(|e| PriceError::io(staged.path(), e))?;
    staged
        .persist(path)
        .map_err(|e| PriceError::io(path, e.error))?;
    Ok(())
}

/// A CSV pair read from disk.
#[derive(Debug, Clone)]
pub struct LocalPair {
    pub registry: String,
    pub prices: String,
    pub dir: PathBuf,
}

/// Paths of a freshly saved pair.
#[derive(Debug, Clone)]
pub struct SavedPair {
    pub registry: PathBuf,
    pub prices: PathBuf,
}

/// Ordered candidate directories plus the retention count.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    candidates: Vec<PathBuf>,
    keep_versions: usize,
}

impl SnapshotStore {
    /// Candidates are the override (if any), then
    /// `<project_root>/src/static/data`, then `<project_root>/data`.
    pub fn new(local_override: Option<PathBuf>, project_root: &Path, keep_versions: usize) -> Self {
        let mut candidates: Vec<PathBuf> = local_override.into_iter().collect();
        candidates.push(project_root.join("src").join("static").join("data"));
        candidates.push(project_root.join("data"));
        Self::from_dirs(candidates, keep_versions)
    }

    /// Use exactly these directories, in this order.
    pub fn from_dirs(candidates: Vec<PathBuf>, keep_versions: usize) -> Self {
        Self {
            candidates,
            keep_versions: keep_versions.max(1),
        }
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// First candidate that exists or can be created.
    pub fn preferred_dir(&self) -> Option<PathBuf> {
        self.candidates.iter().find_map(|dir| {
            if dir.is_dir() {
                return Some(dir.clone());
            }
            match fs::create_dir_all(dir) {
                Ok(()) => Some(dir.clone()),
                Err(e) => {
                    debug!(dir = %dir.display(), error = %e, "skipping candidate directory");
                    None
                }
            }
        })
    }

    /// Check the preferred directory by writing and removing a file.
    pub fn check_preferred_dir_writable(&self) -> bool {
        let Some(dir) = self.preferred_dir() else {
            warn!(candidates = ?self.candidates, "no local CSV directory could be created");
            return false;
        };
        let check = dir.join(WRITE_CHECK_FILE);
        match fs::write(&check, b"ok").and_then(|()| fs::remove_file(&check)) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    dir = %dir.display(),
                    error = %e,
                    "preferred local CSV directory is not writable"
                );
                false
            }
        }
    }

    /// Save a freshly fetched pair and prune old versions.
    pub fn save_pair(
        &self,
        registry_text: &str,
        prices_text: &str,
        fetched_at: DateTime<Utc>,
    ) -> Result<SavedPair, PriceError> {
        let dir = self
            .preferred_dir()
            .ok_or_else(|| PriceError::LocalNotFound {
                searched: self.candidates.clone(),
            })?;

        let stamp = fetched_at.format(TIMESTAMP_FORMAT).to_string();
        let registry = dir.join(format!("{REGISTRY_DATASET}_{stamp}.csv"));
        let prices = dir.join(format!("{PRICES_DATASET}_{stamp}.csv"));

        write_atomic(&registry, &encode_latin1(registry_text))?;
        write_atomic(&prices, &encode_latin1(prices_text))?;
        info!(
            dir = %dir.display(),
            registry = %registry.display(),
            prices = %prices.display(),
            "saved fetched CSVs"
        );

        prune(&dir, REGISTRY_DATASET, self.keep_versions);
        prune(&dir, PRICES_DATASET, self.keep_versions);

        Ok(SavedPair { registry, prices })
    }

    /// Load the newest complete pair from the first directory that has one.
    ///
    /// Within a directory the newest timestamp present for both datasets is
    /// preferred, then the untimestamped `<dataset>.csv` pair.
    pub fn load_latest_pair(&self) -> Result<LocalPair, PriceError> {
        for dir in &self.candidates {
            let Some((registry_path, prices_path)) = latest_pair_in(dir) else {
                continue;
            };
            let registry = read_latin1(&registry_path)?;
            let prices = read_latin1(&prices_path)?;
            info!(
                registry = %registry_path.display(),
                prices = %prices_path.display(),
                "loaded CSV data from local files"
            );
            return Ok(LocalPair {
                registry,
                prices,
                dir: dir.clone(),
            });
        }
        Err(PriceError::LocalNotFound {
            searched: self.candidates.clone(),
        })
    }

    /// Newest snapshot timestamp across all candidate directories.
    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.candidates
            .iter()
            .flat_map(|dir| snapshot_stamps(dir, REGISTRY_DATASET))
            .max()
            .map(|naive| naive.and_utc())
    }
}

fn read_latin1(path: &Path) -> Result<String, PriceError> {
    fs::read(path)
        .map(|bytes| decode_latin1(&bytes))
        .map_err(|e| PriceError::io(path, e))
}

/// Timestamped snapshot files for `dataset` in `dir`, newest first.
fn snapshot_files(dir: &Path, dataset: &str) -> Vec<(NaiveDateTime, PathBuf)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let prefix = format!("{dataset}_");
    let mut files: Vec<(NaiveDateTime, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            let stamp = name.strip_prefix(&prefix)?.strip_suffix(".csv")?;
            let ts = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
            Some((ts, entry.path()))
        })
        .collect();
    files.sort_by(|a, b| b.0.cmp(&a.0));
    files
}

fn snapshot_stamps(dir: &Path, dataset: &str) -> Vec<NaiveDateTime> {
    snapshot_files(dir, dataset).into_iter().map(|(ts, _)| ts).collect()
}

fn latest_pair_in(dir: &Path) -> Option<(PathBuf, PathBuf)> {
    let prices = snapshot_files(dir, PRICES_DATASET);
    let timestamped = snapshot_files(dir, REGISTRY_DATASET)
        .into_iter()
        .find_map(|(ts, registry)| {
            prices
                .iter()
                .find(|(p_ts, _)| *p_ts == ts)
                .map(|(_, p)| (registry, p.clone()))
        });
    if timestamped.is_some() {
        return timestamped;
    }

    let registry = dir.join(format!("{REGISTRY_DATASET}.csv"));
    let prices = dir.join(format!("{PRICES_DATASET}.csv"));
    (registry.is_file() && prices.is_file()).then_some((registry, prices))
}

/// Delete all but the `keep` newest snapshots of `dataset` in `dir`.
///
/// Returns the number of files removed. Failures are logged, not raised.
pub fn prune(dir: &Path, dataset: &str, keep: usize) -> usize {
    let mut removed = 0;
    for (_, path) in snapshot_files(dir, dataset).into_iter().skip(keep) {
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed old CSV snapshot");
                removed += 1;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to remove old CSV snapshot")
            }
        }
    }
    removed
}
