//! Fuel price data: acquisition, parsing, merging, caching and ranking.
//!
//! The publisher exposes two CSV files, a station registry and a price list.
//! [`PricePipeline`] turns them into a [`CombinedDataset`] cached as JSON,
//! and answers [`StationQuery`]s against it.

mod cache;
mod error;
mod filter;
mod format;
mod merge;
mod parse;
mod pipeline;
mod snapshots;
mod source;
mod types;

pub use cache::{DEFAULT_CACHE_PATH, DatasetCache};
pub use error::PriceError;
pub use filter::{
    ExclusionCounts, QueryResult, RECENCY_WINDOW_DAYS, RankedStation, StationQuery, filter_stations,
    parse_observed_at,
};
pub use format::{DelimiterChoice, InvalidDelimiter, decode_latin1, detect_delimiter, encode_latin1};
pub use merge::{combine, merge};
pub use parse::{ParseStats, parse_prices, parse_registry};
pub use pipeline::{DEFAULT_MAX_AGE, DataSource, PipelineStatus, PricePipeline};
pub use snapshots::{LocalPair, PRICES_DATASET, REGISTRY_DATASET, SavedPair, SnapshotStore, prune};
pub use source::{
    DEFAULT_PRICES_URL, DEFAULT_REGISTRY_URL, FetchedSources, SourceConfig, SourceFetcher,
    SourceOrigin,
};
pub use types::{
    CombinedDataset, PriceRecord, Registry, RegistryRecord, StationPrice, StationRecord,
};
