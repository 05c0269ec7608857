//! Job registry and job control handlers.

use super::{AddJobsRequest, JobIdsResponse, StartJobsRequest};
use crate::api::AppState;
use crate::engine::args::format_for_height;
use crate::error::{ApiError, DownloadError, Error};
use crate::types::JobId;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// GET /jobs - List all jobs
pub async fn list_jobs(State(state): State<AppState>) -> Result<Response, Error> {
    let jobs = state.downloader.list().await?;
    Ok((StatusCode::OK, Json(jobs)).into_response())
}

/// GET /jobs/:id - Get a single job
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Response, Error> {
    match state.downloader.get(JobId(id)).await? {
        Some(job) => Ok((StatusCode::OK, Json(job)).into_response()),
        None => Err(DownloadError::NotFound { id }.into()),
    }
}

/// POST /jobs - Resolve a URL and enqueue what it contains
pub async fn add_jobs(
    State(state): State<AppState>,
    Json(request): Json<AddJobsRequest>,
) -> Response {
    let url = request.url.trim();
    if url.is_empty() {
        return ApiError::validation("url must not be empty").into_response();
    }

    let ids = match state.downloader.add_url(url).await {
        Ok(ids) => ids,
        Err(e) => return e.into_response(),
    };

    if request.start {
        let params = state.downloader.default_launch_params().await;
        for id in &ids {
            if let Err(e) = state.downloader.start(*id, params.clone()).await {
                tracing::warn!(job_id = %id, error = %e, "could not start new job");
            }
        }
    }

    (StatusCode::CREATED, Json(JobIdsResponse { ids })).into_response()
}

/// POST /jobs/start - Start every unclaimed pending job
pub async fn start_jobs(
    State(state): State<AppState>,
    request: Option<Json<StartJobsRequest>>,
) -> Result<Response, Error> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let mut params = state.downloader.default_launch_params().await;
    if let Some(format) = request.format.filter(|f| !f.trim().is_empty()) {
        params.format_spec = format;
    } else if request.max_height.is_some() {
        params.format_spec = format_for_height(request.max_height);
    }

    let ids = state.downloader.start_all(params).await?;
    Ok((StatusCode::OK, Json(JobIdsResponse { ids })).into_response())
}

/// POST /jobs/:id/pause - Pause an active job
pub async fn pause_job(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<StatusCode, Error> {
    state.downloader.pause(JobId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /jobs/:id/resume - Resume a paused job
pub async fn resume_job(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<StatusCode, Error> {
    state.downloader.resume(JobId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /jobs/:id/cancel - Cancel a job
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<StatusCode, Error> {
    state.downloader.cancel(JobId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /jobs/:id/retry - Retry a failed or cancelled job
pub async fn retry_job(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<StatusCode, Error> {
    state.downloader.retry(JobId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /jobs/finished - Remove cancelled, completed and failed jobs
pub async fn clear_finished(State(state): State<AppState>) -> Result<Response, Error> {
    let ids = state.downloader.clear_finished().await?;
    Ok((StatusCode::OK, Json(JobIdsResponse { ids })).into_response())
}

/// GET /stats - Per-status job counts
pub async fn queue_stats(State(state): State<AppState>) -> Result<Response, Error> {
    let stats = state.downloader.stats().await?;
    Ok((StatusCode::OK, Json(stats)).into_response())
}
