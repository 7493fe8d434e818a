//! Nominatim-style geocoding client.

use serde::Deserialize;

use crate::geo::GeoLocation;
use crate::retry;

use super::error::GeocodeError;

/// Default search endpoint (OpenStreetMap Nominatim).
pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org/search";

/// Default `User-Agent`; Nominatim rejects anonymous clients.
pub const DEFAULT_USER_AGENT: &str = "FuelFinder/1.0";

/// One search candidate. Nominatim sends coordinates as strings.
#[derive(Debug, Deserialize)]
struct Candidate {
    lat: Coordinate,
    lon: Coordinate,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Coordinate {
    Number(f64),
    Text(String),
}

impl Coordinate {
    fn value(&self) -> Option<f64> {
        match self {
            Coordinate::Number(v) => Some(*v),
            Coordinate::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Configuration for the geocoding client.
#[derive(Debug, Clone)]
pub struct GeocoderConfig {
    /// Search endpoint URL
    pub base_url: String,
    /// Sent as the `User-Agent` header
    pub user_agent: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl GeocoderConfig {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_GEOCODER_URL.to_string(),
            user_agent: user_agent.into(),
            timeout_secs: 10,
        }
    }

    /// Set a custom base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self::new(DEFAULT_USER_AGENT)
    }
}

/// Client for a Nominatim-compatible search endpoint.
#[derive(Debug, Clone)]
pub struct GeocoderClient {
    http: reqwest::Client,
    base_url: String,
}

impl GeocoderClient {
    pub fn new(config: GeocoderConfig) -> Result<Self, GeocodeError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url,
        })
    }

    /// Look up the best match for an already-normalized city name.
    ///
    /// Makes exactly one request; retries are the caller's business.
    pub async fn search(&self, city: &str) -> Result<GeoLocation, GeocodeError> {
        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("q", city),
                ("format", "json"),
                ("limit", "1"),
                ("countrycodes", "it"),
                ("accept-language", "it"),
            ])
            .send()
            .await?;
        let status = response.status();

        if retry::is_rate_limit_status(status) {
            return Err(GeocodeError::RateLimited {
                status: status.as_u16(),
                retry_after: retry::retry_after(response.headers()),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeocodeError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = response.text().await?;
        let candidates: Vec<Candidate> =
            serde_json::from_str(&body).map_err(|e| GeocodeError::Json {
                message: e.to_string(),
            })?;

        let Some(best) = candidates.first() else {
            return Err(GeocodeError::NotFound {
                city: city.to_string(),
            });
        };
        match (best.lat.value(), best.lon.value()) {
            (Some(lat), Some(lon)) => Ok(GeoLocation::new(lat, lon)),
            _ => Err(GeocodeError::Json {
                message: format!("unparseable coordinates for '{city}'"),
            }),
        }
    }
}
