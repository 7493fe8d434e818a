//! Distance, recency and fuel filtering of the merged dataset.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;

use crate::fuel;
use crate::geo::GeoLocation;

use super::types::{CombinedDataset, StationRecord};

/// Price observations older than this are not ranked.
pub const RECENCY_WINDOW_DAYS: i64 = 7;

const DATETIME_FORMATS: [&str; 4] = [
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

const DATE_FORMATS: [&str; 3] = ["%d/%m/%Y", "%Y-%m-%d", "%d-%m-%Y"];

/// Parse a publisher timestamp. Naive times are taken as UTC and bare dates
/// as midnight.
pub fn parse_observed_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
    {
        return Some(dt.and_utc());
    }
    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(raw, f).ok())
    {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// One station search.
#[derive(Debug, Clone)]
pub struct StationQuery {
    pub center: GeoLocation,
    pub radius_km: f64,
    /// Canonical fuel kind.
    pub fuel: String,
    pub limit: usize,
    pub recency: ChronoDuration,
}

impl StationQuery {
    /// Build a query, canonicalizing the requested fuel kind.
    pub fn new(center: GeoLocation, radius_km: f64, fuel_kind: &str, limit: usize) -> Self {
        Self {
            center,
            radius_km,
            fuel: fuel::canonicalize(fuel_kind),
            limit,
            recency: ChronoDuration::days(RECENCY_WINDOW_DAYS),
        }
    }

    pub fn with_recency(mut self, recency: ChronoDuration) -> Self {
        self.recency = recency;
        self
    }
}

/// A station that passed every filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedStation {
    pub station_id: u64,
    pub operator_name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub fuel: String,
    pub price: f64,
    pub is_self_service: bool,
    pub observed_at: String,
    /// Great-circle distance from the query center, rounded to 2 decimals.
    pub distance_km: f64,
}

/// Stations dropped per reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExclusionCounts {
    pub no_price: usize,
    pub stale: usize,
    pub invalid_coords: usize,
    pub out_of_range: usize,
}

impl ExclusionCounts {
    pub fn total(&self) -> usize {
        self.no_price + self.stale + self.invalid_coords + self.out_of_range
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub stations: Vec<RankedStation>,
    pub excluded: ExclusionCounts,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Filter and rank `dataset` for `query` as of `now`.
///
/// Checks run in a fixed order (price present, price recent, coordinates
/// valid, within radius) and each excluded station is counted once, under
/// the first check it fails. Survivors are sorted by ascending price, keeping
/// dataset order among equal prices.
pub fn filter_stations(
    dataset: &CombinedDataset,
    query: &StationQuery,
    now: DateTime<Utc>,
) -> QueryResult {
    let mut excluded = ExclusionCounts::default();
    let mut stations: Vec<RankedStation> = dataset
        .stations()
        .filter_map(|station| match evaluate(station, query, now) {
            Ok(ranked) => Some(ranked),
            Err(reason) => {
                match reason {
                    Exclusion::NoPrice => excluded.no_price += 1,
                    Exclusion::Stale => excluded.stale += 1,
                    Exclusion::InvalidCoords => excluded.invalid_coords += 1,
                    Exclusion::OutOfRange => excluded.out_of_range += 1,
                }
                None
            }
        })
        .collect();

    stations.sort_by(|a, b| a.price.total_cmp(&b.price));
    let keep = if stations.is_empty() {
        0
    } else {
        query.limit.clamp(1, stations.len())
    };
    stations.truncate(keep);

    QueryResult { stations, excluded }
}

enum Exclusion {
    NoPrice,
    Stale,
    InvalidCoords,
    OutOfRange,
}

fn evaluate(
    station: &StationRecord,
    query: &StationQuery,
    now: DateTime<Utc>,
) -> Result<RankedStation, Exclusion> {
    let price = station.prices.get(&query.fuel).ok_or(Exclusion::NoPrice)?;

    let observed = parse_observed_at(&price.observed_at).ok_or(Exclusion::Stale)?;
    if now.signed_duration_since(observed) > query.recency {
        return Err(Exclusion::Stale);
    }

    let location = station.location();
    if !location.is_valid() {
        return Err(Exclusion::InvalidCoords);
    }

    let distance = query.center.distance_km(&location);
    if distance > query.radius_km {
        return Err(Exclusion::OutOfRange);
    }

    Ok(RankedStation {
        station_id: station.station_id,
        operator_name: station.operator_name.clone(),
        address: station.address.clone(),
        latitude: station.latitude,
        longitude: station.longitude,
        fuel: query.fuel.clone(),
        price: price.price,
        is_self_service: price.is_self_service,
        observed_at: price.observed_at.clone(),
        distance_km: round2(distance),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prices::format::DelimiterChoice;
    use crate::prices::merge::combine;
    use crate::prices::parse::tests::{PRICE_HEADER, REGISTRY_HEADER, price_row, registry_row};
    use crate::prices::types::StationPrice;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap()
    }

    fn station(id: u64, lat: f64, lon: f64, fuel: &str, price: f64, date: &str) -> StationRecord {
        let mut prices = BTreeMap::new();
        prices.insert(
            fuel.to_string(),
            StationPrice {
                price,
                is_self_service: false,
                observed_at: date.to_string(),
            },
        );
        StationRecord {
            station_id: id,
            operator_name: format!("op{id}"),
            address: String::new(),
            latitude: lat,
            longitude: lon,
            prices,
        }
    }

    fn florence() -> GeoLocation {
        GeoLocation::new(43.7696, 11.2558)
    }

    fn near_florence(radius_km: f64, fuel: &str, limit: usize) -> StationQuery {
        StationQuery::new(florence(), radius_km, fuel, limit)
    }

    fn florence_registry() -> String {
        let row = registry_row("123", "43,7696", "11,2558", '|');
        format!("{REGISTRY_HEADER}\n{row}\n")
    }

    #[test]
    fn parses_publisher_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2026, 2, 10, 8, 30, 15).unwrap();
        assert_eq!(parse_observed_at("10/02/2026 08:30:15"), Some(expected));
        assert_eq!(
            parse_observed_at("10/02/2026 08:30"),
            Some(Utc.with_ymd_and_hms(2026, 2, 10, 8, 30, 0).unwrap())
        );
        assert_eq!(
            parse_observed_at("10/02/2026"),
            Some(Utc.with_ymd_and_hms(2026, 2, 10, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_observed_at("2026-02-10T08:30:15Z"), Some(expected));
        assert_eq!(parse_observed_at("2026-02-10 08:30:15"), Some(expected));
        assert_eq!(parse_observed_at("yesterday"), None);
        assert_eq!(parse_observed_at(""), None);
    }

    #[test]
    fn scenario_single_station_match() {
        let registry = florence_registry();
        let prices = format!(
            "{PRICE_HEADER}\n{}\n",
            price_row("123", "benzina", "1,50", "10/02/2026 08:00:00", '|')
        );
        let dataset = combine(&registry, &prices, DelimiterChoice::Auto);

        let result = filter_stations(&dataset, &near_florence(10.0, "benzina", 5), now());
        assert_eq!(result.stations.len(), 1);
        assert_eq!(result.stations[0].station_id, 123);
        assert_eq!(result.stations[0].price, 1.5);
        assert_eq!(result.stations[0].distance_km, 0.0);
        assert_eq!(result.excluded.total(), 0);
    }

    #[test]
    fn scenario_unparseable_price_is_skipped() {
        let registry = florence_registry();
        let prices = format!(
            "{PRICE_HEADER}\n{}\n",
            price_row("123", "benzina", "n/a", "10/02/2026 08:00:00", '|')
        );
        let dataset = combine(&registry, &prices, DelimiterChoice::Auto);

        let result = filter_stations(&dataset, &near_florence(10.0, "benzina", 5), now());
        assert!(result.stations.is_empty());
        assert_eq!(result.excluded.no_price, 1);
        assert_eq!(result.excluded.total(), 1);
    }

    #[test]
    fn excludes_stale_and_zero_coordinates_regardless_of_radius() {
        let dataset: CombinedDataset = [
            station(1, 43.77, 11.25, "benzina", 1.7, "01/01/2026"),
            station(2, 0.0, 0.0, "benzina", 1.6, "10/02/2026"),
            station(3, 43.77, 11.25, "benzina", 1.8, "not a date"),
        ]
        .into_iter()
        .collect();

        let result = filter_stations(&dataset, &near_florence(50_000.0, "benzina", 5), now());
        assert!(result.stations.is_empty());
        assert_eq!(result.excluded.stale, 2);
        assert_eq!(result.excluded.invalid_coords, 1);
    }

    #[test]
    fn date_only_within_window_is_recent() {
        let dataset: CombinedDataset = [station(1, 43.77, 11.25, "benzina", 1.7, "04/02/2026")]
            .into_iter()
            .collect();
        let result = filter_stations(&dataset, &near_florence(10.0, "benzina", 5), now());
        assert_eq!(result.stations.len(), 1);
    }

    #[test]
    fn sorts_by_price_truncates_and_counts_range() {
        let dataset: CombinedDataset = [
            station(1, 43.77, 11.25, "gasolio", 1.75, "10/02/2026"),
            station(2, 43.78, 11.26, "gasolio", 1.65, "10/02/2026"),
            station(3, 43.76, 11.24, "gasolio", 1.70, "10/02/2026"),
            station(4, 45.46, 9.19, "gasolio", 1.50, "10/02/2026"),
            station(5, 43.77, 11.25, "benzina", 1.40, "10/02/2026"),
        ]
        .into_iter()
        .collect();

        let query = StationQuery::new(florence(), 10.0, "diesel", 2);
        let result = filter_stations(&dataset, &query, now());
        let ids: Vec<u64> = result.stations.iter().map(|s| s.station_id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(result.stations[0].fuel, "gasolio");
        assert_eq!(result.excluded.out_of_range, 1);
        assert_eq!(result.excluded.no_price, 1);
    }

    #[test]
    fn zero_limit_still_returns_one() {
        let dataset: CombinedDataset = [station(1, 43.77, 11.25, "benzina", 1.7, "10/02/2026")]
            .into_iter()
            .collect();
        let result = filter_stations(&dataset, &near_florence(10.0, "benzina", 0), now());
        assert_eq!(result.stations.len(), 1);

        let empty = CombinedDataset::new();
        let result = filter_stations(&empty, &near_florence(10.0, "benzina", 0), now());
        assert!(result.stations.is_empty());
    }

    #[test]
    fn empty_fuel_matches_nothing() {
        let dataset: CombinedDataset = [station(1, 43.77, 11.25, "benzina", 1.7, "10/02/2026")]
            .into_iter()
            .collect();
        let result = filter_stations(&dataset, &near_florence(10.0, "  ", 5), now());
        assert!(result.stations.is_empty());
        assert_eq!(result.excluded.no_price, 1);
    }

    #[test]
    fn distance_is_rounded() {
        let dataset: CombinedDataset = [station(1, 43.78, 11.26, "benzina", 1.7, "10/02/2026")]
            .into_iter()
            .collect();
        let result = filter_stations(&dataset, &near_florence(10.0, "benzina", 5), now());
        let d = result.stations[0].distance_km;
        assert_eq!(d, (d * 100.0).round() / 100.0);
        assert!(d > 0.0 && d < 2.0);
    }
}
