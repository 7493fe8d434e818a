//! Data transfer objects for web requests and responses.

use serde::{Deserialize, Serialize};

use crate::prices::{DataSource, PipelineStatus};
use crate::search::SearchRequest;

/// Most results a single search may ask for.
pub const MAX_RESULTS: usize = 50;

fn default_results() -> usize {
    5
}

/// Body of `POST /search`.
#[derive(Debug, Deserialize)]
pub struct SearchBody {
    /// Free-text city name
    pub city: String,

    /// Search radius in kilometres
    pub radius: f64,

    /// Fuel kind (e.g. "benzina", "diesel")
    pub fuel: String,

    /// Number of stations to return, clamped to 1..=50
    #[serde(default = "default_results")]
    pub results: usize,
}

impl SearchBody {
    /// Validate into a core search request.
    pub fn into_request(self) -> Result<SearchRequest, String> {
        let city = self.city.trim();
        if city.is_empty() {
            return Err("city must not be empty".to_string());
        }
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(format!("radius must be a positive number, got {}", self.radius));
        }
        Ok(SearchRequest {
            city: city.to_string(),
            radius_km: self.radius,
            fuel: self.fuel,
            results: self.results.clamp(1, MAX_RESULTS),
        })
    }
}

/// Response of `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// RFC 3339 timestamp of the data in use, if known
    pub last_updated: Option<String>,

    pub source: DataSource,

    pub is_stale: bool,
}

impl From<PipelineStatus> for StatusResponse {
    fn from(status: PipelineStatus) -> Self {
        Self {
            last_updated: status.last_updated.map(|t| t.to_rfc3339()),
            source: status.source,
            is_stale: status.is_stale,
        }
    }
}

/// Generic `{"status": ...}` acknowledgement.
#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub status: &'static str,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
