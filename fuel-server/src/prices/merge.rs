//! Joins registry rows and price rows into a [`CombinedDataset`].

use std::collections::btree_map::Entry;

use tracing::{debug, warn};

use super::format::DelimiterChoice;
use super::parse::{parse_prices, parse_registry};
use super::types::{CombinedDataset, PriceRecord, Registry, StationPrice, StationRecord};

/// Merge parsed rows. Pure and deterministic.
///
/// For each station and fuel kind the lowest price is kept. A later row
/// only replaces an earlier one when strictly cheaper, so among equal
/// prices the first row seen wins. Rows without a parsed price never
/// replace anything.
pub fn merge(registry: Registry, prices: impl IntoIterator<Item = PriceRecord>) -> CombinedDataset {
    let mut dataset: CombinedDataset = registry
        .into_values()
        .map(StationRecord::from_registry)
        .collect();

    let mut rows = 0usize;
    let mut updates = 0usize;
    for record in prices {
        rows += 1;
        let Some(price) = record.price else {
            continue;
        };
        let Some(station) = dataset.get_mut(record.station_id) else {
            continue;
        };

        let candidate = StationPrice {
            price,
            is_self_service: record.is_self_service,
            observed_at: record.observed_at,
        };
        match station.prices.entry(record.fuel_kind) {
            Entry::Vacant(slot) => {
                slot.insert(candidate);
                updates += 1;
            }
            Entry::Occupied(mut slot) if price < slot.get().price => {
                slot.insert(candidate);
                updates += 1;
            }
            Entry::Occupied(_) => {}
        }
    }

    debug!(stations = dataset.len(), rows, updates, "merged price rows into registry");
    if updates == 0 && rows > 0 {
        warn!(rows, "no price updates applied, check delimiter and column layout");
    }

    dataset
}

/// Parse both source texts and merge them.
pub fn combine(
    registry_text: &str,
    prices_text: &str,
    delimiter: DelimiterChoice,
) -> CombinedDataset {
    let (registry, _) = parse_registry(registry_text, delimiter);
    let (prices, _) = parse_prices(prices_text, delimiter, &registry);
    merge(registry, prices)
}
