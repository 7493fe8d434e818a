use fuel_server::config::AppConfig;
use fuel_server::search::FuelFinder;
use fuel_server::web::{AppState, create_router};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("fuel_server=info")),
        )
        .init();

    let config = AppConfig::from_env()?;
    let finder = FuelFinder::from_config(&config)?;

    let snapshots = finder.prices().snapshots();
    if !snapshots.check_preferred_dir_writable() {
        warn!("CSV snapshots will not be saved");
    }
    if let Some(latest) = snapshots.latest_timestamp() {
        info!(%latest, "newest local CSV snapshot");
    }

    // Seed the cache from local CSVs so the first search needs no download.
    let preload = finder.clone();
    tokio::spawn(async move {
        match preload.prices().preload_local().await {
            Ok(stations) => info!(stations, "preloaded local CSV data"),
            Err(e) => info!(error = %e, "no local CSV data to preload"),
        }
    });

    let app = create_router(AppState::new(finder));

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "fuel finder listening");
    info!("endpoints: POST /search, GET /status, POST /reload, GET /health");

    axum::serve(listener, app).await?;
    Ok(())
}
