//! Row parsers for the registry and price datasets.
//!
//! Malformed rows are skipped and counted, never propagated: a file that
//! yields no usable rows is a valid, empty result.

use tracing::{debug, warn};

use crate::fuel;

use super::format::{DelimiterChoice, read_rows, strip_bom};
use super::types::{PriceRecord, Registry, RegistryRecord};

// Registry columns.
const REG_ID: usize = 0;
const REG_OPERATOR: usize = 2;
const REG_ADDRESS: std::ops::Range<usize> = 5..8;
const REG_LAT: usize = 8;
const REG_LON: usize = 9;

// Price list columns.
const PRICE_ID: usize = 0;
const PRICE_FUEL: usize = 1;
const PRICE_VALUE: usize = 2;
const PRICE_SELF: usize = 3;
const PRICE_DATE: usize = 4;
const PRICE_MIN_COLUMNS: usize = 5;

/// Counters for one parse pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub rows: usize,
    pub accepted: usize,
    pub skipped: usize,
}

/// Parse a positive integer station id.
pub fn parse_station_id(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse::<u64>().ok().filter(|&id| id > 0)
}

/// Parse a decimal that may use a comma separator (`1,759` or `1.759`).
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    raw.replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Parse the station registry.
pub fn parse_registry(text: &str, delimiter: DelimiterChoice) -> (Registry, ParseStats) {
    let text = strip_bom(text);
    let delimiter = delimiter.resolve(text);
    let rows = read_rows(text, delimiter);

    let mut registry = Registry::new();
    let mut stats = ParseStats {
        rows: rows.len(),
        ..ParseStats::default()
    };

    for row in &rows {
        match registry_record(row) {
            Some(record) => {
                registry.insert(record.station_id, record);
                stats.accepted += 1;
            }
            None => stats.skipped += 1,
        }
    }

    debug!(
        rows = stats.rows,
        valid = registry.len(),
        delimiter = %char::from(delimiter),
        "parsed station registry"
    );
    if registry.is_empty() && !rows.is_empty() {
        warn!(
            delimiter = %char::from(delimiter),
            sample_row = ?rows[0],
            "no valid registry entries parsed, check delimiter and column layout"
        );
    }

    (registry, stats)
}

fn registry_record(row: &csv::StringRecord) -> Option<RegistryRecord> {
    if row.len() <= REG_LON {
        return None;
    }
    let station_id = parse_station_id(row.get(REG_ID)?)?;
    let (Some(latitude), Some(longitude)) = (
        row.get(REG_LAT).and_then(parse_decimal),
        row.get(REG_LON).and_then(parse_decimal),
    ) else {
        debug!(station_id, "skipping registry row with unparseable coordinates");
        return None;
    };

    let address = REG_ADDRESS
        .filter_map(|i| row.get(i))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    Some(RegistryRecord {
        station_id,
        operator_name: row.get(REG_OPERATOR).unwrap_or_default().trim().to_string(),
        address,
        latitude,
        longitude,
    })
}

/// Parse the price list, keeping only rows for stations in `registry`.
///
/// Rows whose price is empty or malformed are returned with `price: None`
/// so the merger can tell "absent" from zero.
pub fn parse_prices(
    text: &str,
    delimiter: DelimiterChoice,
    registry: &Registry,
) -> (Vec<PriceRecord>, ParseStats) {
    let text = strip_bom(text);
    let delimiter = delimiter.resolve(text);
    let rows = read_rows(text, delimiter);

    let mut records = Vec::with_capacity(rows.len());
    let mut stats = ParseStats {
        rows: rows.len(),
        ..ParseStats::default()
    };

    for row in &rows {
        match price_record(row, registry) {
            Some(record) => {
                records.push(record);
                stats.accepted += 1;
            }
            None => stats.skipped += 1,
        }
    }

    debug!(
        rows = stats.rows,
        matched = stats.accepted,
        delimiter = %char::from(delimiter),
        "parsed price list"
    );

    (records, stats)
}

fn price_record(row: &csv::StringRecord, registry: &Registry) -> Option<PriceRecord> {
    if row.len() < PRICE_MIN_COLUMNS {
        return None;
    }
    let station_id = parse_station_id(row.get(PRICE_ID)?)?;
    if !registry.contains_key(&station_id) {
        return None;
    }

    Some(PriceRecord {
        station_id,
        fuel_kind: fuel::canonicalize(row.get(PRICE_FUEL).unwrap_or_default()),
        price: row.get(PRICE_VALUE).and_then(parse_decimal),
        is_self_service: row.get(PRICE_SELF).is_some_and(|v| v.trim() == "1"),
        observed_at: row.get(PRICE_DATE).unwrap_or_default().trim().to_string(),
    })
}
