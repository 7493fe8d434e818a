//! Application state for the web layer.

use crate::search::FuelFinder;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Geocoding and price search
    pub finder: FuelFinder,
}

impl AppState {
    pub fn new(finder: FuelFinder) -> Self {
        Self { finder }
    }
}
