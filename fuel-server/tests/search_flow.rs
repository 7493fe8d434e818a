//! End-to-end searches against mocked upstreams.

use std::path::Path;
use std::time::Duration;

use fuel_server::config::AppConfig;
use fuel_server::prices::DataSource;
use fuel_server::search::{FuelFinder, SearchRequest};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REGISTRY_HEADER: &str =
    "idImpianto|Gestore|Bandiera|Tipo Impianto|Nome Impianto|Indirizzo|Comune|Provincia|Latitudine|Longitudine";
const PRICES_HEADER: &str = "idImpianto|descCarburante|prezzo|isSelf|dtComu";

fn today() -> String {
    chrono::Utc::now().format("%d/%m/%Y %H:%M:%S").to_string()
}

fn registry_csv() -> String {
    format!(
        "{REGISTRY_HEADER}\n\
         123|Rossi Srl|Agip|Stradale|Rossi|Via Roma 1|Firenze|FI|43,7696|11,2558\n\
         124|Bianchi|IP|Stradale|Bianchi|Viale Europa 9|Firenze|FI|43,7800|11,2600\n\
         999|Lontano|Q8|Stradale|Lontano|Via Milano 3|Milano|MI|45,4642|9,1900\n"
    )
}

fn prices_csv(benzina_123: &str) -> String {
    let today = today();
    format!(
        "{PRICES_HEADER}\n\
         123|Benzina|{benzina_123}|1|{today}\n\
         124|Benzina senza piombo|1,62|0|{today}\n\
         124|Gasolio|1,55|1|{today}\n\
         999|Benzina|1,40|1|{today}\n"
    )
}

async fn mount_csvs(server: &MockServer, prices: String, expected: u64) {
    Mock::given(method("GET"))
        .and(path("/anagrafica_impianti_attivi.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string(registry_csv()))
        .expect(expected)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/prezzo_alle_8.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string(prices))
        .expect(expected)
        .mount(server)
        .await;
}

async fn mount_geocoder(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "firenze"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"[{"lat":"43.7696","lon":"11.2558"}]"#),
        )
        .mount(server)
        .await;
}

fn config(server: &MockServer, root: &Path) -> AppConfig {
    AppConfig::default()
        .with_urls(
            format!("{}/anagrafica_impianti_attivi.csv", server.uri()),
            format!("{}/prezzo_alle_8.csv", server.uri()),
        )
        .with_geocoder_url(format!("{}/search", server.uri()))
        .with_cache_path(root.join("data").join("prezzi_cache.json"))
        .with_project_root(root)
}

fn request(city: &str, fuel: &str) -> SearchRequest {
    SearchRequest {
        city: city.to_string(),
        radius_km: 10.0,
        fuel: fuel.to_string(),
        results: 5,
    }
}

fn snapshot_count(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.file_name().to_string_lossy().ends_with(".csv"))
                .count()
        })
        .unwrap_or(0)
}

#[tokio::test]
async fn finds_cheapest_station_near_city() {
    let server = MockServer::start().await;
    mount_csvs(&server, prices_csv("1,50"), 1).await;
    mount_geocoder(&server).await;
    let root = TempDir::new().unwrap();
    let finder = FuelFinder::from_config(&config(&server, root.path())).unwrap();

    let response = finder.search(&request("Florence", "benzina")).await;
    assert_eq!(response.warning, None);
    let ids: Vec<u64> = response.stations.iter().map(|s| s.station_id).collect();
    assert_eq!(ids, vec![123, 124]);
    assert_eq!(response.stations[0].price, 1.5);
    assert_eq!(response.stations[0].address, "Via Roma 1 Firenze FI");
    assert_eq!(response.stations[0].distance_km, 0.0);
    assert!(response.stations[0].is_self_service);

    // Second search is served from the cache (the CSV mocks expect one hit).
    let diesel = finder.search(&request("Firenze", "diesel")).await;
    assert_eq!(diesel.stations.len(), 1);
    assert_eq!(diesel.stations[0].station_id, 124);

    let status = finder.status().await;
    assert_eq!(status.source, DataSource::Cache);
    assert!(!status.is_stale);

    // The fetched pair was saved under the preferred local directory.
    assert_eq!(snapshot_count(&root.path().join("src").join("static").join("data")), 2);
}

#[tokio::test]
async fn unparseable_price_excludes_station_without_error() {
    let server = MockServer::start().await;
    mount_csvs(&server, prices_csv("n/a"), 1).await;
    mount_geocoder(&server).await;
    let root = TempDir::new().unwrap();
    let finder = FuelFinder::from_config(&config(&server, root.path())).unwrap();

    let response = finder.search(&request("Firenze", "benzina")).await;
    let ids: Vec<u64> = response.stations.iter().map(|s| s.station_id).collect();
    assert_eq!(ids, vec![124]);
}

#[tokio::test]
async fn empty_cache_file_is_never_trusted() {
    let server = MockServer::start().await;
    mount_csvs(&server, prices_csv("1,50"), 1).await;
    mount_geocoder(&server).await;
    let root = TempDir::new().unwrap();
    let config = config(&server, root.path());
    std::fs::create_dir_all(root.path().join("data")).unwrap();
    std::fs::write(&config.cache_path, "{}").unwrap();

    let finder = FuelFinder::from_config(&config).unwrap();
    let response = finder.search(&request("Firenze", "benzina")).await;
    assert_eq!(response.stations.len(), 2);
    assert_eq!(finder.status().await.source, DataSource::Remote);
}

#[tokio::test]
async fn rate_limited_geocoder_uses_local_city_table() {
    let server = MockServer::start().await;
    mount_csvs(&server, prices_csv("1,50"), 1).await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(509).insert_header("Retry-After", "1"))
        .mount(&server)
        .await;
    let root = TempDir::new().unwrap();
    std::fs::create_dir_all(root.path().join("data")).unwrap();
    std::fs::write(
        root.path().join("data").join("cities.json"),
        r#"{"firenze": {"latitude": 43.77, "longitude": 11.25}}"#,
    )
    .unwrap();

    let finder = FuelFinder::from_config(&config(&server, root.path())).unwrap();
    let response = finder.search(&request("Firenze", "benzina")).await;
    assert_eq!(response.warning, None);
    assert_eq!(response.stations[0].station_id, 123);
}

#[tokio::test]
async fn publisher_outage_falls_back_to_local_snapshots() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/anagrafica_impianti_attivi.csv"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/prezzo_alle_8.csv"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    mount_geocoder(&server).await;

    let root = TempDir::new().unwrap();
    let local = root.path().join("offline");
    std::fs::create_dir_all(&local).unwrap();
    std::fs::write(
        local.join("anagrafica_impianti_attivi_20260210_080000.csv"),
        registry_csv(),
    )
    .unwrap();
    std::fs::write(local.join("prezzo_alle_8_20260210_080000.csv"), prices_csv("1,50")).unwrap();

    let config = config(&server, root.path()).with_local_data_dir(&local);
    let finder = FuelFinder::from_config(&config).unwrap();
    let response = finder.search(&request("Firenze", "benzina")).await;
    assert_eq!(response.stations.len(), 2);
    assert_eq!(finder.status().await.source, DataSource::Local);
}

#[tokio::test]
async fn publisher_outage_without_snapshots_warns() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/anagrafica_impianti_attivi.csv"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/prezzo_alle_8.csv"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    mount_geocoder(&server).await;

    let root = TempDir::new().unwrap();
    let finder = FuelFinder::from_config(&config(&server, root.path())).unwrap();
    let response = finder.search(&request("Firenze", "benzina")).await;
    assert!(response.stations.is_empty());
    assert!(response.warning.is_some());
}

#[tokio::test]
async fn slow_publisher_download_outlives_search_timeout() {
    let server = MockServer::start().await;
    for (route, body) in [
        ("/anagrafica_impianti_attivi.csv", registry_csv()),
        ("/prezzo_alle_8.csv", prices_csv("1,50")),
    ] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body)
                    .set_delay(Duration::from_millis(800)),
            )
            .expect(1)
            .mount(&server)
            .await;
    }
    mount_geocoder(&server).await;
    let root = TempDir::new().unwrap();

    let impatient = config(&server, root.path()).with_search_timeout(Duration::from_millis(300));
    let finder = FuelFinder::from_config(&impatient).unwrap();
    let response = finder.search(&request("Firenze", "benzina")).await;
    assert!(response.stations.is_empty());
    assert!(response.warning.unwrap().contains("took too long"));

    for _ in 0..50 {
        if finder.status().await.source == DataSource::Remote {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    // A fresh finder is served from the cache the abandoned search filled.
    let patient = FuelFinder::from_config(&config(&server, root.path())).unwrap();
    let response = patient.search(&request("Firenze", "benzina")).await;
    assert_eq!(response.stations.len(), 2);
    assert_eq!(patient.status().await.source, DataSource::Cache);
}
