//! The price data pipeline: fresh cache, else fetch, parse, merge and store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::cache::DatasetCache;
use super::error::PriceError;
use super::filter::{QueryResult, StationQuery, filter_stations};
use super::format::DelimiterChoice;
use super::merge::combine;
use super::snapshots::SnapshotStore;
use super::source::{SourceFetcher, SourceOrigin};
use super::types::CombinedDataset;

/// Default cache max age: 12 hours.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(12 * 60 * 60);

/// Where the most recently loaded dataset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Cache,
    Remote,
    Local,
    Unknown,
}

/// Snapshot of the pipeline's data state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStatus {
    pub last_updated: Option<DateTime<Utc>>,
    pub source: DataSource,
    pub is_stale: bool,
}

#[derive(Debug)]
struct LoadState {
    last_updated: Option<DateTime<Utc>>,
    source: DataSource,
}

struct Inner {
    fetcher: SourceFetcher,
    cache: DatasetCache,
    max_age: Duration,
    delimiter: DelimiterChoice,
    state: RwLock<LoadState>,
    /// Held across a rebuild so concurrent cache misses share one fetch.
    rebuild: Mutex<()>,
}

/// Thread-safe handle to the price pipeline.
///
/// Cheap to clone; all clones share the same cache file and load state.
#[derive(Clone)]
pub struct PricePipeline {
    inner: Arc<Inner>,
}

impl PricePipeline {
    pub fn new(
        fetcher: SourceFetcher,
        cache: DatasetCache,
        max_age: Duration,
        delimiter: DelimiterChoice,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                cache,
                max_age,
                delimiter,
                state: RwLock::new(LoadState {
                    last_updated: None,
                    source: DataSource::Unknown,
                }),
                rebuild: Mutex::new(()),
            }),
        }
    }

    pub fn cache(&self) -> &DatasetCache {
        &self.inner.cache
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        self.inner.fetcher.snapshots()
    }

    /// The current dataset, from the cache when usable, otherwise rebuilt
    /// from the sources (remote, or local snapshots as a fallback).
    pub async fn dataset(&self) -> Result<CombinedDataset, PriceError> {
        if let Some(dataset) = self.cached().await? {
            return Ok(dataset);
        }

        let _rebuild = self.inner.rebuild.lock().await;
        // Another caller may have rebuilt the cache while we waited.
        if let Some(dataset) = self.cached().await? {
            return Ok(dataset);
        }

        let sources = self.inner.fetcher.fetch().await?;
        let source = match &sources.origin {
            SourceOrigin::Remote => DataSource::Remote,
            SourceOrigin::Local(dir) => {
                warn!(dir = %dir.display(), "using local CSV snapshot instead of remote data");
                DataSource::Local
            }
        };

        let dataset = self.build_and_store(sources.registry, sources.prices).await?;
        info!(stations = dataset.len(), source = ?source, "price dataset rebuilt");
        self.record(source, Some(Utc::now())).await;
        Ok(dataset)
    }

    /// Filter and rank the current dataset.
    pub async fn query(&self, query: &StationQuery) -> Result<QueryResult, PriceError> {
        let dataset = self.dataset().await?;
        Ok(filter_stations(&dataset, query, Utc::now()))
    }

    pub async fn status(&self) -> PipelineStatus {
        let (recorded, source) = {
            let state = self.inner.state.read().await;
            (state.last_updated, state.source)
        };

        let cache = self.inner.cache.clone();
        let snapshots = self.snapshots().clone();
        let max_age = self.inner.max_age;
        let (last_updated, is_fresh) = tokio::task::spawn_blocking(move || {
            let last_updated = recorded
                .or_else(|| cache.modified())
                .or_else(|| snapshots.latest_timestamp());
            (last_updated, cache.is_fresh(max_age))
        })
        .await
        .unwrap_or((recorded, false));

        PipelineStatus {
            last_updated,
            source,
            is_stale: !is_fresh,
        }
    }

    /// Delete the cache file and rebuild the dataset in the background.
    ///
    /// Returns immediately. The handle resolves to the rebuilt station count.
    pub fn force_reload(&self) -> JoinHandle<Result<usize, PriceError>> {
        if let Err(e) = self.inner.cache.clear() {
            warn!(error = %e, "failed to clear dataset cache");
        }
        info!("dataset cache cleared, reloading in background");

        let pipeline = self.clone();
        tokio::spawn(async move {
            match pipeline.dataset().await {
                Ok(dataset) => {
                    info!(stations = dataset.len(), "background reload finished");
                    Ok(dataset.len())
                }
                Err(e) => {
                    error!(error = %e, "background reload failed");
                    Err(e)
                }
            }
        })
    }

    /// Build the cache from the newest local CSV pair without going online.
    pub async fn preload_local(&self) -> Result<usize, PriceError> {
        let _rebuild = self.inner.rebuild.lock().await;
        let store = self.snapshots().clone();
        let pair = tokio::task::spawn_blocking(move || store.load_latest_pair()).await??;
        let dataset = self.build_and_store(pair.registry, pair.prices).await?;
        info!(
            stations = dataset.len(),
            dir = %pair.dir.display(),
            "preloaded dataset from local CSVs"
        );
        self.record(DataSource::Local, Some(Utc::now())).await;
        Ok(dataset.len())
    }

    /// The cached dataset if usable, recording it as the current source.
    async fn cached(&self) -> Result<Option<CombinedDataset>, PriceError> {
        let cache = self.inner.cache.clone();
        let max_age = self.inner.max_age;
        let loaded = tokio::task::spawn_blocking(move || {
            cache
                .load_usable(max_age)
                .map(|dataset| (dataset, cache.modified()))
        })
        .await?;

        let Some((dataset, modified)) = loaded else {
            return Ok(None);
        };
        self.record(DataSource::Cache, modified).await;
        Ok(Some(dataset))
    }

    async fn build_and_store(
        &self,
        registry: String,
        prices: String,
    ) -> Result<CombinedDataset, PriceError> {
        let cache = self.inner.cache.clone();
        let delimiter = self.inner.delimiter;
        let dataset = tokio::task::spawn_blocking(move || {
            let dataset = combine(&registry, &prices, delimiter);
            if let Err(e) = cache.store(&dataset) {
                warn!(error = %e, "failed to store dataset cache");
            }
            dataset
        })
        .await?;
        Ok(dataset)
    }

    async fn record(&self, source: DataSource, last_updated: Option<DateTime<Utc>>) {
        let mut state = self.inner.state.write().await;
        state.source = source;
        state.last_updated = last_updated;
    }
}
