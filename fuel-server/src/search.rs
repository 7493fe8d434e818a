//! The caller-facing search interface.
//!
//! [`FuelFinder`] chains the resolver and the price pipeline. It never
//! fails: every problem becomes an empty station list with a warning the
//! caller can show to the user.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::geocoding::{
    GeocodeError, GeocoderClient, GeocoderConfig, ResultCache, ResultCacheConfig, Resolver,
    candidate_paths,
};
use crate::prices::{
    DatasetCache, PipelineStatus, PriceError, PricePipeline, RankedStation, SnapshotStore,
    SourceConfig, SourceFetcher, StationQuery,
};

const WARN_UNAVAILABLE: &str =
    "Geocoding service is temporarily unavailable. Please try again later.";
const WARN_NO_DATA: &str = "Fuel station data is temporarily unavailable. Please try again later.";
const WARN_TIMEOUT: &str = "The search took too long to complete. Please try again later.";
const WARN_FAILED: &str = "The search failed unexpectedly. Please try again later.";

/// Errors building a [`FuelFinder`] from configuration.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("price pipeline setup failed: {0}")]
    Price(#[from] PriceError),

    #[error("geocoder setup failed: {0}")]
    Geocode(#[from] GeocodeError),
}

/// One search, already validated by the caller.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub city: String,
    pub radius_km: f64,
    /// Fuel kind in any accepted spelling (`diesel`, `Gasolio`, ...).
    pub fuel: String,
    pub results: usize,
}

/// Ranked stations plus an optional user-facing warning.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResponse {
    pub stations: Vec<RankedStation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl SearchResponse {
    fn warning(message: impl Into<String>) -> Self {
        Self {
            stations: Vec::new(),
            warning: Some(message.into()),
        }
    }
}

/// Geocoding plus price lookup behind one handle.
#[derive(Clone)]
pub struct FuelFinder {
    resolver: Arc<Resolver>,
    prices: PricePipeline,
    timeout: Duration,
}

impl FuelFinder {
    pub fn new(resolver: Resolver, prices: PricePipeline, timeout: Duration) -> Self {
        Self {
            resolver: Arc::new(resolver),
            prices,
            timeout,
        }
    }

    /// Wire up every component from `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self, SetupError> {
        let snapshots = SnapshotStore::new(
            config.local_data_dir.clone(),
            &config.project_root,
            config.keep_versions,
        );
        let fetcher = SourceFetcher::new(
            SourceConfig::new(&config.registry_url, &config.prices_url),
            snapshots,
        )?;
        let prices = PricePipeline::new(
            fetcher,
            DatasetCache::new(&config.cache_path),
            config.cache_max_age,
            config.delimiter,
        );

        let client = GeocoderClient::new(
            GeocoderConfig::new(&config.user_agent).with_base_url(&config.geocoder_url),
        )?;
        let cache = ResultCache::new(&ResultCacheConfig {
            ttl: config.geocode_cache_ttl,
            max_capacity: config.geocode_cache_capacity,
        });
        let local_paths = candidate_paths(
            config.cities_path.as_deref(),
            &config.cache_path,
            &config.project_root,
        );
        let resolver = Resolver::new(client, cache, local_paths);

        Ok(Self::new(resolver, prices, config.search_timeout))
    }

    pub fn prices(&self) -> &PricePipeline {
        &self.prices
    }

    /// Find the cheapest stations selling `fuel` near `city`.
    ///
    /// The whole resolve-then-filter sequence runs as a detached task under
    /// the configured timeout. On expiry the task is abandoned, not
    /// cancelled, so a slow download still fills the cache for later
    /// searches; the caller gets a timeout warning.
    pub async fn search(&self, request: &SearchRequest) -> SearchResponse {
        info!(
            city = %request.city,
            radius_km = request.radius_km,
            fuel = %request.fuel,
            results = request.results,
            "search request"
        );
        let finder = self.clone();
        let owned = request.clone();
        let task = tokio::spawn(async move { finder.run(&owned).await });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(city = %request.city, error = %e, "search task failed");
                SearchResponse::warning(WARN_FAILED)
            }
            Err(_) => {
                warn!(
                    city = %request.city,
                    timeout_secs = self.timeout.as_secs(),
                    "search timed out"
                );
                SearchResponse::warning(WARN_TIMEOUT)
            }
        }
    }

    async fn run(&self, request: &SearchRequest) -> SearchResponse {
        let center = match self.resolver.resolve(&request.city).await {
            Ok(location) => location,
            Err(GeocodeError::NotFound { city }) => {
                return SearchResponse::warning(format!(
                    "City '{city}' was not found. Please check the name and try again."
                ));
            }
            Err(e) => {
                warn!(error = %e, "geocoding unavailable");
                return SearchResponse::warning(WARN_UNAVAILABLE);
            }
        };

        let query = StationQuery::new(center, request.radius_km, &request.fuel, request.results);
        let result = match self.prices.query(&query).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "price data unavailable");
                return SearchResponse::warning(WARN_NO_DATA);
            }
        };

        info!(
            returned = result.stations.len(),
            no_price = result.excluded.no_price,
            stale = result.excluded.stale,
            invalid_coords = result.excluded.invalid_coords,
            out_of_range = result.excluded.out_of_range,
            "search finished"
        );

        let warning = (result.excluded.invalid_coords > 0).then(|| {
            format!(
                "{} stations were skipped because their coordinates are invalid.",
                result.excluded.invalid_coords
            )
        });
        SearchResponse {
            stations: result.stations,
            warning,
        }
    }

    pub async fn status(&self) -> PipelineStatus {
        self.prices.status().await
    }

    /// Clear the price cache and rebuild it in the background.
    pub fn force_reload(&self) -> JoinHandle<Result<usize, PriceError>> {
        self.prices.force_reload()
    }
}
