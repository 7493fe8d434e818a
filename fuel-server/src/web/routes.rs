//! HTTP route handlers.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::search::SearchResponse;

use super::dto::*;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/search", post(search))
        .route("/status", get(status))
        .route("/reload", post(reload))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> Json<StatusMessage> {
    Json(StatusMessage { status: "ok" })
}

/// Search for the cheapest stations near a city.
///
/// Upstream failures are reported through `warning`, never as errors.
async fn search(
    State(state): State<AppState>,
    Json(body): Json<SearchBody>,
) -> Result<Json<SearchResponse>, AppError> {
    let request = body
        .into_request()
        .map_err(|message| AppError::BadRequest { message })?;
    Ok(Json(state.finder.search(&request).await))
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(state.finder.status().await.into())
}

/// Clear the cache and refetch in the background.
async fn reload(State(state): State<AppState>) -> (StatusCode, Json<StatusMessage>) {
    // Detached: the handle is dropped and the reload logs its own outcome.
    drop(state.finder.force_reload());
    info!("reload requested");
    (StatusCode::ACCEPTED, Json(StatusMessage { status: "reloading" }))
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    BadRequest { message: String },
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest { message } => (StatusCode::BAD_REQUEST, message),
        };

        warn!(%status, %message, "request failed");

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}
