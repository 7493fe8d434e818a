//! Records produced by parsing and merging the two publisher datasets.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::geo::GeoLocation;

/// One row of the station registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub station_id: u64,
    pub operator_name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Registry rows keyed by station id.
pub type Registry = BTreeMap<u64, RegistryRecord>;

/// One row of the price list.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    pub station_id: u64,
    /// Canonical fuel kind (see [`crate::fuel::canonicalize`]).
    pub fuel_kind: String,
    /// `None` when the price column was empty or malformed.
    pub price: Option<f64>,
    pub is_self_service: bool,
    /// Observation timestamp exactly as published.
    pub observed_at: String,
}

/// Best known price for one fuel kind at one station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationPrice {
    pub price: f64,
    pub is_self_service: bool,
    pub observed_at: String,
}

/// Registry data merged with the station's prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationRecord {
    pub station_id: u64,
    pub operator_name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub prices: BTreeMap<String, StationPrice>,
}

impl StationRecord {
    /// Start a record from its registry row, with no prices yet.
    pub fn from_registry(record: RegistryRecord) -> Self {
        Self {
            station_id: record.station_id,
            operator_name: record.operator_name,
            address: record.address,
            latitude: record.latitude,
            longitude: record.longitude,
            prices: BTreeMap::new(),
        }
    }

    pub fn location(&self) -> GeoLocation {
        GeoLocation::new(self.latitude, self.longitude)
    }
}

/// All merged stations keyed by id. This is the unit of caching.
///
/// Backed by ordered maps so that serialization is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CombinedDataset {
    stations: BTreeMap<u64, StationRecord>,
}

impl CombinedDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn get(&self, station_id: u64) -> Option<&StationRecord> {
        self.stations.get(&station_id)
    }

    pub fn stations(&self) -> impl Iterator<Item = &StationRecord> {
        self.stations.values()
    }

    pub fn insert(&mut self, record: StationRecord) {
        self.stations.insert(record.station_id, record);
    }

    pub(crate) fn get_mut(&mut self, station_id: u64) -> Option<&mut StationRecord> {
        self.stations.get_mut(&station_id)
    }
}

impl FromIterator<StationRecord> for CombinedDataset {
    fn from_iter<I: IntoIterator<Item = StationRecord>>(iter: I) -> Self {
        let mut dataset = Self::new();
        for record in iter {
            dataset.insert(record);
        }
        dataset
    }
}
