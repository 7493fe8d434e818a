//! Application configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::geocoding::{DEFAULT_GEOCODER_URL, DEFAULT_USER_AGENT};
use crate::prices::{
    DEFAULT_CACHE_PATH, DEFAULT_MAX_AGE, DEFAULT_PRICES_URL, DEFAULT_REGISTRY_URL, DelimiterChoice,
};

/// Error reading configuration from the environment.
#[derive(Debug, thiserror::Error)]
#[error("invalid value {value:?} for {var}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

/// All tunables of the service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Station registry CSV URL.
    pub registry_url: String,
    /// Price list CSV URL.
    pub prices_url: String,
    /// Combined dataset JSON cache.
    pub cache_path: PathBuf,
    /// Cache older than this is refetched.
    pub cache_max_age: Duration,
    /// Searched before the built-in CSV directories.
    pub local_data_dir: Option<PathBuf>,
    /// Base for the built-in CSV and `cities.json` locations.
    pub project_root: PathBuf,
    /// Timestamped snapshot pairs kept per dataset.
    pub keep_versions: usize,
    pub delimiter: DelimiterChoice,
    pub geocoder_url: String,
    pub user_agent: String,
    pub geocode_cache_capacity: u64,
    pub geocode_cache_ttl: Duration,
    /// Explicit offline city table; otherwise well-known locations are searched.
    pub cities_path: Option<PathBuf>,
    /// Upper bound for one whole search (geocode + filter).
    pub search_timeout: Duration,
    pub bind_addr: SocketAddr,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            prices_url: DEFAULT_PRICES_URL.to_string(),
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            cache_max_age: DEFAULT_MAX_AGE,
            local_data_dir: None,
            project_root: PathBuf::from("."),
            keep_versions: 3,
            delimiter: DelimiterChoice::Auto,
            geocoder_url: DEFAULT_GEOCODER_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            geocode_cache_capacity: 1000,
            geocode_cache_ttl: Duration::from_secs(60 * 60),
            cities_path: None,
            search_timeout: Duration::from_secs(30),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
        }
    }
}

impl AppConfig {
    /// Read `FUEL_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`AppConfig::from_env`] but with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get("FUEL_REGISTRY_URL") {
            config.registry_url = v;
        }
        if let Some(v) = get("FUEL_PRICES_URL") {
            config.prices_url = v;
        }
        if let Some(v) = get("FUEL_CACHE_PATH") {
            config.cache_path = PathBuf::from(v);
        }
        if let Some(v) = get("FUEL_CACHE_HOURS") {
            let hours: f64 = parse("FUEL_CACHE_HOURS", &v)?;
            config.cache_max_age =
                Duration::try_from_secs_f64(hours * 3600.0).map_err(|e| ConfigError {
                    var: "FUEL_CACHE_HOURS",
                    value: v.clone(),
                    reason: e.to_string(),
                })?;
        }
        config.local_data_dir = get("FUEL_LOCAL_DATA_DIR").map(PathBuf::from);
        if let Some(v) = get("FUEL_PROJECT_ROOT") {
            config.project_root = PathBuf::from(v);
        }
        if let Some(v) = get("FUEL_KEEP_VERSIONS") {
            config.keep_versions = parse("FUEL_KEEP_VERSIONS", &v)?;
        }
        // Not trimmed: a bare tab is a valid setting.
        if let Some(v) = lookup("FUEL_CSV_DELIMITER") {
            config.delimiter = v.parse().map_err(|e: crate::prices::InvalidDelimiter| ConfigError {
                var: "FUEL_CSV_DELIMITER",
                value: v.clone(),
                reason: e.to_string(),
            })?;
        }
        if let Some(v) = get("FUEL_GEOCODER_URL") {
            config.geocoder_url = v;
        }
        if let Some(v) = get("FUEL_USER_AGENT") {
            config.user_agent = v;
        }
        config.cities_path = get("FUEL_CITIES_PATH").map(PathBuf::from);
        if let Some(v) = get("FUEL_SEARCH_TIMEOUT_SECS") {
            config.search_timeout = Duration::from_secs(parse("FUEL_SEARCH_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("FUEL_BIND_ADDR") {
            config.bind_addr = parse("FUEL_BIND_ADDR", &v)?;
        }

        Ok(config)
    }

    pub fn with_urls(
        mut self,
        registry_url: impl Into<String>,
        prices_url: impl Into<String>,
    ) -> Self {
        self.registry_url = registry_url.into();
        self.prices_url = prices_url.into();
        self
    }

    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = path.into();
        self
    }

    pub fn with_local_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.local_data_dir = Some(dir.into());
        self
    }

    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = root.into();
        self
    }

    pub fn with_geocoder_url(mut self, url: impl Into<String>) -> Self {
        self.geocoder_url = url.into();
        self
    }

    pub fn with_search_timeout(mut self, timeout: Duration) -> Self {
        self.search_timeout = timeout;
        self
    }
}

fn parse<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
