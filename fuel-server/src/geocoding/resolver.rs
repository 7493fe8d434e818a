//! City name → coordinates with caching, retry and offline fallback.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::geo::GeoLocation;
use crate::retry::{Disposition, FallbackStrategy, Outcome, RetryPolicy};

use super::cache::ResultCache;
use super::client::GeocoderClient;
use super::error::GeocodeError;
use super::local::LocalCityTable;

/// English names mapped to the Italian names the provider expects.
const ALIASES: &[(&str, &str)] = &[
    ("florence", "firenze"),
    ("rome", "roma"),
    ("milan", "milano"),
    ("venice", "venezia"),
    ("naples", "napoli"),
    ("turin", "torino"),
    ("genoa", "genova"),
];

/// Longest `Retry-After` we are willing to sleep through.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(10);

/// Trim, lower-case and apply the alias table. Also the cache key.
pub fn normalize_city(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == lowered)
        .map(|(_, name)| (*name).to_string())
        .unwrap_or(lowered)
}

/// How a failed provider call should be handled.
pub fn classify(err: &GeocodeError) -> Disposition {
    match err {
        GeocodeError::RateLimited { retry_after, .. } => Disposition::Fallback {
            wait: retry_after.map(|d| d.min(MAX_RETRY_AFTER)),
        },
        GeocodeError::Http(_) => Disposition::Retry,
        GeocodeError::Api { status, .. } if *status >= 500 => Disposition::Retry,
        GeocodeError::NotFound { .. }
        | GeocodeError::Api { .. }
        | GeocodeError::Json { .. }
        | GeocodeError::ServiceUnavailable { .. } => Disposition::Fail,
    }
}

/// Resolves free-text city names to coordinates.
///
/// Owns its result cache and its lazily loaded local table, so independent
/// resolvers never share state.
pub struct Resolver {
    client: GeocoderClient,
    cache: ResultCache,
    local_paths: Vec<PathBuf>,
    local: OnceCell<LocalCityTable>,
    strategy: FallbackStrategy<fn(&GeocodeError) -> Disposition>,
}

impl Resolver {
    /// `local_paths` are searched in order the first time a fallback is needed.
    pub fn new(client: GeocoderClient, cache: ResultCache, local_paths: Vec<PathBuf>) -> Self {
        Self {
            client,
            cache,
            local_paths,
            local: OnceCell::new(),
            strategy: FallbackStrategy::new(
                RetryPolicy::default(),
                classify as fn(&GeocodeError) -> Disposition,
            ),
        }
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.strategy = FallbackStrategy::new(policy, classify as fn(&GeocodeError) -> Disposition);
        self
    }

    /// Use this table instead of loading one from disk.
    pub fn with_local_table(mut self, table: LocalCityTable) -> Self {
        self.local = OnceCell::new_with(Some(table));
        self
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Resolve `city` to coordinates.
    ///
    /// Fails only with [`GeocodeError::NotFound`] (the provider has no match)
    /// or [`GeocodeError::ServiceUnavailable`] (no answer remotely or locally).
    /// Only provider answers are cached; local fallbacks are not.
    pub async fn resolve(&self, city: &str) -> Result<GeoLocation, GeocodeError> {
        let key = normalize_city(city);
        if key.is_empty() {
            return Err(GeocodeError::NotFound {
                city: city.to_string(),
            });
        }

        if let Some(hit) = self.cache.get(&key).await {
            info!(city = %key, "found city in geocoding cache");
            return Ok(hit);
        }

        let outcome = self
            .strategy
            .run(|| self.client.search(&key), || self.local_lookup(&key))
            .await;

        match outcome {
            Ok(Outcome::Remote(location)) => {
                self.cache.insert(key.clone(), location).await;
                debug!(
                    city = %key,
                    lat = location.latitude,
                    lon = location.longitude,
                    cached = self.cache.entry_count(),
                    "geocoded city"
                );
                Ok(location)
            }
            Ok(Outcome::Local(location)) => {
                warn!(city = %key, "using local fallback coordinates");
                Ok(location)
            }
            Err(GeocodeError::NotFound { .. }) => Err(GeocodeError::NotFound {
                city: city.trim().to_string(),
            }),
            Err(e) => {
                warn!(city = %key, error = %e, "geocoding failed with no local fallback");
                Err(GeocodeError::ServiceUnavailable { reason: e.to_string() })
            }
        }
    }

    async fn local_table(&self) -> &LocalCityTable {
        self.local
            .get_or_init(|| async {
                let paths = self.local_paths.clone();
                tokio::task::spawn_blocking(move || LocalCityTable::load_first(&paths))
                    .await
                    .unwrap_or_default()
            })
            .await
    }

    async fn local_lookup(&self, key: &str) -> Option<GeoLocation> {
        self.local_table().await.get(key)
    }
}
