//! REST API server module
//!
//! Exposes the job registry, job control, engine updates and the event stream over HTTP.

use crate::{Config, MediaDownloader, Result};
use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod error_response;
pub mod routes;
pub mod state;

pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Jobs
/// - `GET /jobs` - List all jobs
/// - `POST /jobs` - Resolve a URL into pending jobs
/// - `GET /jobs/:id` - Get a single job
/// - `POST /jobs/start` - Start every unclaimed pending job
/// - `POST /jobs/:id/pause` - Pause an active job
/// - `POST /jobs/:id/resume` - Resume a paused job
/// - `POST /jobs/:id/cancel` - Cancel a job
/// - `POST /jobs/:id/retry` - Retry a failed or cancelled job
/// - `DELETE /jobs/finished` - Remove finished jobs
/// - `GET /stats` - Per-status job counts
///
/// ## Engine
/// - `GET /engine/update` - Check for a newer engine release
/// - `POST /engine/update` - Install the latest engine release
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /events` - Server-sent events stream
pub fn create_router(downloader: Arc<MediaDownloader>, config: Arc<Config>) -> Router {
    let state = AppState::new(downloader, config.clone());

    let router = Router::new()
        // Jobs
        .route("/jobs", get(routes::list_jobs))
        .route("/jobs", post(routes::add_jobs))
        .route("/jobs/start", post(routes::start_jobs))
        .route("/jobs/finished", delete(routes::clear_finished))
        .route("/jobs/:id", get(routes::get_job))
        .route("/jobs/:id/pause", post(routes::pause_job))
        .route("/jobs/:id/resume", post(routes::resume_job))
        .route("/jobs/:id/cancel", post(routes::cancel_job))
        .route("/jobs/:id/retry", post(routes::retry_job))
        .route("/stats", get(routes::queue_stats))
        // Engine
        .route("/engine/update", get(routes::check_engine_update))
        .route("/engine/update", post(routes::apply_engine_update))
        // System
        .route("/health", get(routes::health_check))
        .route("/events", get(routes::event_stream))
        .with_state(state);

    // Last layer applied runs first: CORS → trace → auth → handler
    let router = if config.api.api_key.is_some() {
        router.layer(middleware::from_fn_with_state(
            config.api.api_key.clone(),
            auth::require_api_key,
        ))
    } else {
        router
    };

    let router = router.layer(TraceLayer::new_for_http());

    if config.api.cors_enabled {
        router.layer(build_cors_layer(&config.api.cors_origins))
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` (or an empty list) allows any origin; unparseable origins are skipped.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until the server stops.
///
/// # Example
///
/// ```no_run
/// use media_dl::{MediaDownloader, Config};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let downloader = Arc::new(MediaDownloader::new((*config).clone()).await?);
///
/// media_dl::api::start_api_server(downloader, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(downloader: Arc<MediaDownloader>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.api.bind_address;

    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(downloader, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(all(test, unix))]
mod tests;
