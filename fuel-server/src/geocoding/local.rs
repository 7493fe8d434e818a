//! Offline city → coordinate table used when the provider is unavailable.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::geo::GeoLocation;

/// File name searched for next to the cache and in the data directories.
pub const CITIES_FILE: &str = "cities.json";

/// Where to look for the table, in order.
///
/// An explicit path wins outright; otherwise `cities.json` beside the cache
/// file, then under `<project_root>/src/static/data` and `<project_root>/data`.
pub fn candidate_paths(
    explicit: Option<&Path>,
    cache_path: &Path,
    project_root: &Path,
) -> Vec<PathBuf> {
    if let Some(path) = explicit {
        return vec![path.to_path_buf()];
    }
    let mut candidates = Vec::with_capacity(3);
    if let Some(parent) = cache_path.parent() {
        candidates.push(parent.join(CITIES_FILE));
    }
    candidates.push(project_root.join("src").join("static").join("data").join(CITIES_FILE));
    candidates.push(project_root.join("data").join(CITIES_FILE));
    candidates
}

/// Static coordinates keyed by trimmed, lower-cased city name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalCityTable {
    entries: HashMap<String, GeoLocation>,
}

impl LocalCityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse either `{name: {latitude|lat, longitude|lon}}` or
    /// `[{city|name|nome, lat|latitude, lon|longitude}]`.
    ///
    /// Entries missing a name or a coordinate are ignored.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        let mut table = Self::new();
        match value {
            Value::Object(map) => {
                for (name, coords) in &map {
                    if let Some(location) =
                        coordinates(coords, ["latitude", "lat"], ["longitude", "lon"])
                    {
                        table.insert(name, location);
                    }
                }
            }
            Value::Array(items) => {
                for item in &items {
                    let name = ["city", "name", "nome"]
                        .iter()
                        .find_map(|key| item.get(key).and_then(Value::as_str))
                        .unwrap_or_default();
                    if let Some(location) =
                        coordinates(item, ["lat", "latitude"], ["lon", "longitude"])
                    {
                        table.insert(name, location);
                    }
                }
            }
            _ => {}
        }
        Ok(table)
    }

    /// Load the first candidate that exists and parses. Never fails: with no
    /// usable file the table is simply empty.
    pub fn load_first(candidates: &[PathBuf]) -> Self {
        for path in candidates {
            let Ok(text) = std::fs::read_to_string(path) else {
                continue;
            };
            match Self::from_json(&text) {
                Ok(table) => {
                    debug!(
                        path = %path.display(),
                        entries = table.len(),
                        "loaded local city coordinates"
                    );
                    return table;
                }
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "failed to parse local cities file")
                }
            }
        }
        debug!(candidates = ?candidates, "no local cities file found");
        Self::new()
    }

    pub fn insert(&mut self, name: &str, location: GeoLocation) {
        let key = name.trim().to_lowercase();
        if !key.is_empty() {
            self.entries.insert(key, location);
        }
    }

    /// Look up a name already normalized by the resolver.
    pub fn get(&self, name: &str) -> Option<GeoLocation> {
        self.entries.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coordinates(value: &Value, lat_keys: [&str; 2], lon_keys: [&str; 2]) -> Option<GeoLocation> {
    let lat = lat_keys.iter().find_map(|k| value.get(k).and_then(number))?;
    let lon = lon_keys.iter().find_map(|k| value.get(k).and_then(number))?;
    Some(GeoLocation::new(lat, lon))
}
