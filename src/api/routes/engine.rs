//! Engine update handlers.

use crate::api::AppState;
use crate::error::Error;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

/// GET /engine/update - Compare the installed engine with the latest release
pub async fn check_engine_update(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, Error> {
    let check = state.downloader.check_update().await?;
    Ok((StatusCode::OK, Json(check)))
}

/// POST /engine/update - Install the latest engine release
///
/// Answers once the update finished; progress is also reported on `/events`.
pub async fn apply_engine_update(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, Error> {
    let outcome = state.downloader.apply_update().await?;
    Ok((StatusCode::OK, Json(outcome)))
}
