//! Bounded, time-expiring memo of successful geocoding results.

use std::time::Duration;

use moka::future::Cache as MokaCache;

use crate::geo::GeoLocation;

/// Configuration for the result cache.
#[derive(Debug, Clone)]
pub struct ResultCacheConfig {
    /// TTL for cached entries.
    pub ttl: Duration,

    /// Maximum number of cached entries.
    pub max_capacity: u64,
}

impl Default for ResultCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60 * 60),
            max_capacity: 1000,
        }
    }
}

/// Geocoding results keyed by normalized city name.
#[derive(Clone)]
pub struct ResultCache {
    entries: MokaCache<String, GeoLocation>,
}

impl ResultCache {
    pub fn new(config: &ResultCacheConfig) -> Self {
        let entries = MokaCache::builder()
            .time_to_live(config.ttl)
            .max_capacity(config.max_capacity)
            .build();
        Self { entries }
    }

    pub async fn get(&self, key: &str) -> Option<GeoLocation> {
        self.entries.get(key).await
    }

    pub async fn insert(&self, key: String, location: GeoLocation) {
        self.entries.insert(key, location).await;
    }

    /// Approximate entry count (for monitoring).
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }

    #[cfg(test)]
    pub(crate) async fn sync(&self) {
        self.entries.run_pending_tasks().await;
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(&ResultCacheConfig::default())
    }
}
