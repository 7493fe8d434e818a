//! Acquisition of the two raw CSV sources.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::retry::{self, Disposition, FallbackStrategy, Outcome, RetryPolicy};

use super::error::PriceError;
use super::format::{decode_latin1, strip_bom};
use super::snapshots::SnapshotStore;

/// Default registry download.
pub const DEFAULT_REGISTRY_URL: &str =
    "https://www.mimit.gov.it/images/exportCSV/anagrafica_impianti_attivi.csv";

/// Default price list download.
pub const DEFAULT_PRICES_URL: &str = "https://www.mimit.gov.it/images/exportCSV/prezzo_alle_8.csv";

/// Payloads shorter than this are probably an error page.
const SUSPICIOUS_PAYLOAD_CHARS: usize = 50;

/// Configuration for the CSV downloads.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub registry_url: String,
    pub prices_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl SourceConfig {
    pub fn new(registry_url: impl Into<String>, prices_url: impl Into<String>) -> Self {
        Self {
            registry_url: registry_url.into(),
            prices_url: prices_url.into(),
            timeout: Duration::from_secs(60),
            retry: RetryPolicy::new(2, Duration::from_secs(1)),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::new(DEFAULT_REGISTRY_URL, DEFAULT_PRICES_URL)
    }
}

/// Where a pair of source texts came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOrigin {
    Remote,
    /// Loaded from snapshots in this directory.
    Local(PathBuf),
}

/// Both source texts, decoded and BOM-stripped.
#[derive(Debug, Clone)]
pub struct FetchedSources {
    pub registry: String,
    pub prices: String,
    pub origin: SourceOrigin,
}

/// How a failed CSV download should be handled.
///
/// Network errors and server errors are retried; throttling and other
/// statuses go straight to the local snapshots.
pub fn classify(err: &PriceError) -> Disposition {
    match err {
        PriceError::Http(_) => Disposition::Retry,
        PriceError::Status { status, .. } if *status >= 500 => Disposition::Retry,
        PriceError::Status { .. } => Disposition::Fallback { wait: None },
        // Retry-After is not honored for downloads.
        PriceError::RateLimited { .. } => Disposition::Fallback { wait: None },
        _ => Disposition::Fail,
    }
}

/// Downloads the registry and price list, falling back to local snapshots.
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    http: reqwest::Client,
    config: SourceConfig,
    snapshots: SnapshotStore,
    strategy: FallbackStrategy<fn(&PriceError) -> Disposition>,
}

impl SourceFetcher {
    pub fn new(config: SourceConfig, snapshots: SnapshotStore) -> Result<Self, PriceError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        let strategy = FallbackStrategy::new(
            config.retry.clone(),
            classify as fn(&PriceError) -> Disposition,
        );
        Ok(Self {
            http,
            config,
            snapshots,
            strategy,
        })
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Fetch both sources remotely, or load the newest local pair.
    ///
    /// When no local pair exists the remote error is returned unchanged.
    pub async fn fetch(&self) -> Result<FetchedSources, PriceError> {
        let outcome = self
            .strategy
            .run(|| self.fetch_remote(), || self.load_local())
            .await?;

        if let Outcome::Remote(sources) = &outcome {
            self.persist(sources).await;
        }
        Ok(outcome.into_inner())
    }

    async fn fetch_remote(&self) -> Result<FetchedSources, PriceError> {
        let (registry, prices) = futures::try_join!(
            self.download(&self.config.registry_url),
            self.download(&self.config.prices_url),
        )?;
        Ok(FetchedSources {
            registry,
            prices,
            origin: SourceOrigin::Remote,
        })
    }

    async fn download(&self, url: &str) -> Result<String, PriceError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();

        if retry::is_rate_limit_status(status) {
            return Err(PriceError::RateLimited {
                url: url.to_string(),
                status: status.as_u16(),
                retry_after: retry::retry_after(response.headers()),
            });
        }
        if !status.is_success() {
            return Err(PriceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        let text = strip_bom(&decode_latin1(&bytes)).to_string();
        debug!(url, bytes = bytes.len(), "downloaded CSV");
        if text.len() < SUSPICIOUS_PAYLOAD_CHARS {
            warn!(url, len = text.len(), "CSV payload is suspiciously short");
        }
        Ok(text)
    }

    async fn load_local(&self) -> Option<FetchedSources> {
        let store = self.snapshots.clone();
        match tokio::task::spawn_blocking(move || store.load_latest_pair()).await {
            Ok(Ok(pair)) => Some(FetchedSources {
                registry: strip_bom(&pair.registry).to_string(),
                prices: strip_bom(&pair.prices).to_string(),
                origin: SourceOrigin::Local(pair.dir),
            }),
            Ok(Err(e)) => {
                error!(error = %e, "local CSV fallback failed");
                None
            }
            Err(e) => {
                error!(error = %e, "local CSV fallback task failed");
                None
            }
        }
    }

    /// Save a remote pair as a snapshot. Failures are logged only.
    async fn persist(&self, sources: &FetchedSources) {
        let store = self.snapshots.clone();
        let registry = sources.registry.clone();
        let prices = sources.prices.clone();
        let saved =
            tokio::task::spawn_blocking(move || store.save_pair(&registry, &prices, Utc::now()))
                .await;
        match saved {
            Ok(Ok(pair)) => info!(registry = %pair.registry.display(), "persisted CSV snapshot"),
            Ok(Err(e)) => warn!(error = %e, "failed to persist CSV snapshot"),
            Err(e) => warn!(error = %e, "CSV snapshot task failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prices::snapshots::{PRICES_DATASET, REGISTRY_DATASET};
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const REGISTRY: &str = "idImpianto|Gestore|Bandiera|Tipo|Nome|Indirizzo|Comune|Provincia|Latitudine|Longitudine\n";
    const PRICES: &str = "idImpianto|descCarburante|prezzo|isSelf|dtComu\n";

    fn fetcher(server: &MockServer, dir: &std::path::Path, attempts: u32) -> SourceFetcher {
        let config = SourceConfig::new(
            format!("{}/reg.csv", server.uri()),
            format!("{}/prices.csv", server.uri()),
        )
            .with_retry(RetryPolicy::immediate(attempts));
        SourceFetcher::new(config, SnapshotStore::from_dirs(vec![dir.to_path_buf()], 2)).unwrap()
    }

    fn count_snapshots(dir: &std::path::Path, dataset: &str) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                name.starts_with(&format!("{dataset}_")) && name.ends_with(".csv")
            })
            .count()
    }

    #[test]
    fn classification() {
        assert_eq!(
            classify(&PriceError::Status { url: String::new(), status: 503 }),
            Disposition::Retry
        );
        assert_eq!(
            classify(&PriceError::Status { url: String::new(), status: 404 }),
            Disposition::Fallback { wait: None }
        );
        assert_eq!(
            classify(&PriceError::RateLimited {
                url: String::new(),
                status: 429,
                retry_after: Some(Duration::from_secs(5)),
            }),
            Disposition::Fallback { wait: None }
        );
        assert_eq!(
            classify(&PriceError::Cache { message: String::new() }),
            Disposition::Fail
        );
    }

    #[tokio::test]
    async fn remote_success_decodes_latin1_and_saves_snapshot() {
        let server = MockServer::start().await;
        let mut body = b"\xef\xbb\xbf".to_vec();
        body.extend_from_slice(REGISTRY.as_bytes());
        body.extend_from_slice(b"1|Caff\xe8|x|x|x|Via|Roma|FI|43,1|11,2\n");
        Mock::given(method("GET"))
            .and(path("/reg.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/prices.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PRICES))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let sources = fetcher(&server, dir.path(), 2).fetch().await.unwrap();

        assert_eq!(sources.origin, SourceOrigin::Remote);
        assert!(sources.registry.starts_with("idImpianto"));
        assert!(sources.registry.contains("Caffè"));
        assert_eq!(count_snapshots(dir.path(), REGISTRY_DATASET), 1);
        assert_eq!(count_snapshots(dir.path(), PRICES_DATASET), 1);
    }

    #[tokio::test]
    async fn server_error_is_retried_then_falls_back_to_local() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("anagrafica_impianti_attivi.csv"), REGISTRY).unwrap();
        std::fs::write(dir.path().join("prezzo_alle_8.csv"), PRICES).unwrap();

        let sources = fetcher(&server, dir.path(), 2).fetch().await.unwrap();
        assert_eq!(sources.origin, SourceOrigin::Local(dir.path().to_path_buf()));
        assert_eq!(sources.prices, PRICES);

        // Both attempts reached the server.
        let requests = server.received_requests().await.unwrap();
        assert!(requests.len() >= 2);
        // Fallback data is not re-saved as a snapshot.
        assert_eq!(count_snapshots(dir.path(), REGISTRY_DATASET), 0);
    }

    #[tokio::test]
    async fn rate_limit_without_local_data_keeps_original_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let err = fetcher(&server, dir.path(), 3).fetch().await.unwrap_err();
        match err {
            PriceError::RateLimited { status, retry_after, .. } => {
                assert_eq!(status, 429);
                assert_eq!(retry_after, Some(Duration::from_secs(30)));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn not_found_without_local_data_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let err = fetcher(&server, dir.path(), 3).fetch().await.unwrap_err();
        assert!(matches!(err, PriceError::Status { status: 404, .. }));
    }
}
