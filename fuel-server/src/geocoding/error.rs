//! Geocoding error types.

use std::time::Duration;

/// Errors from resolving a place name.
///
/// [`Resolver::resolve`](super::Resolver::resolve) only ever returns
/// `NotFound` or `ServiceUnavailable`; the other variants describe single
/// provider calls and drive retry decisions.
#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    /// The provider has no match for this name.
    #[error("city '{city}' not found")]
    NotFound { city: String },

    /// The provider is throttling us (HTTP 429 or 509).
    #[error("geocoding provider rate limited (status {status})")]
    RateLimited {
        status: u16,
        retry_after: Option<Duration>,
    },

    /// No answer could be produced, remotely or locally.
    #[error("geocoding service unavailable: {reason}")]
    ServiceUnavailable { reason: String },

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider returned another error status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response JSON
    #[error("JSON parse error: {message}")]
    Json { message: String },
}

impl GeocodeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GeocodeError::NotFound { .. })
    }
}
