//! Place-name resolution.
//!
//! Converts free-text city names into coordinates through a Nominatim-style
//! provider, with retry on transient failures and an offline coordinate
//! table for when the provider is unreachable or throttling.

mod cache;
mod client;
mod error;
mod local;
mod resolver;

pub use cache::{ResultCache, ResultCacheConfig};
pub use client::{DEFAULT_GEOCODER_URL, DEFAULT_USER_AGENT, GeocoderClient, GeocoderConfig};
pub use error::GeocodeError;
pub use local::{CITIES_FILE, LocalCityTable, candidate_paths};
pub use resolver::{Resolver, classify, normalize_city};
