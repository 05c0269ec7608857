//! Error types for media-dl
//!
//! This module provides error handling for the library:
//! - Domain-specific error types (job control, metadata resolution, engine updates)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent_downloads")
        key: Option<String>,
    },

    /// Job control error (unknown job, invalid transition)
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// URL could not be resolved into downloadable items
    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),

    /// Engine update failed
    #[error("update error: {0}")]
    Update(#[from] UpdateError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External tool execution failed (engine spawn, version query)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new work
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Job control errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Job not found in the registry
    #[error("job {id} not found")]
    NotFound {
        /// The job ID that was not found
        id: u64,
    },

    /// Cannot perform operation in current state
    #[error("cannot {operation} job {id} in state {current_state}")]
    InvalidState {
        /// The job ID that is in an invalid state for the operation
        id: u64,
        /// The operation that was attempted (e.g., "pause", "resume", "retry")
        operation: String,
        /// The current state that prevents the operation
        current_state: String,
    },

    /// Launch parameters were discarded (the job was cancelled) so it cannot be relaunched
    #[error("job {id} has no launch parameters to relaunch with")]
    ParametersUnavailable {
        /// The job ID
        id: u64,
    },
}

/// Reasons a URL could not be resolved, most specific first.
///
/// The `Display` text is the short reason shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The engine version is rejected by the remote service (HTTP 403)
    #[error("Access blocked (HTTP 403) - the download engine likely needs an update")]
    BlockedAccess,

    /// Channel membership required
    #[error("This video requires channel membership")]
    MembersOnly,

    /// Private content
    #[error("This video is private")]
    Private,

    /// Login required
    #[error("Login required to access this video")]
    LoginRequired,

    /// Removed or otherwise unavailable
    #[error("This video is unavailable")]
    Unavailable,

    /// Age-restricted content
    #[error("Age-restricted video - login required")]
    AgeRestricted,

    /// Blocked on copyright grounds
    #[error("Video blocked due to copyright")]
    Copyright,

    /// The engine finished but produced no metadata
    #[error("Failed to load video - access denied or video unavailable")]
    NoMetadata,

    /// The engine could not be run at all
    #[error("download engine failed: {0}")]
    Engine(String),

    /// Unclassified engine error message
    #[error("{0}")]
    Other(String),
}

/// Engine update errors. The previously installed binary is preserved in every case.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// Another update is already running
    #[error("an update is already in progress")]
    InProgress,

    /// The release feed returned no usable release
    #[error("no release information available")]
    NoRelease,

    /// The release has no asset for this platform
    #[error("release {version} has no asset named {asset}")]
    AssetMissing {
        /// Release version
        version: String,
        /// Expected asset name
        asset: String,
    },

    /// Downloading the asset failed
    #[error("failed to download {url}: {reason}")]
    DownloadFailed {
        /// Asset URL
        url: String,
        /// Underlying failure
        reason: String,
    },

    /// Downloaded bytes did not match the published checksum
    #[error("checksum mismatch for {asset}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Asset name
        asset: String,
        /// Published SHA-256
        expected: String,
        /// Computed SHA-256
        actual: String,
    },

    /// Moving the new binary into place failed
    #[error("failed to replace engine binary: {0}")]
    ReplaceFailed(String),
}

/// API error response format
///
/// ```json
/// {
///   "error": {
///     "code": "job_not_found",
///     "message": "download error: job 12 not found",
///     "details": { "job_id": 12 }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "job_not_found", "invalid_state")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 400,

            Error::NotFound(_) => 404,
            Error::Download(DownloadError::NotFound { .. }) => 404,

            Error::Download(DownloadError::InvalidState { .. }) => 409,
            Error::Download(DownloadError::ParametersUnavailable { .. }) => 409,
            Error::Update(UpdateError::InProgress) => 409,

            Error::Resolve(ResolveError::Engine(_)) => 503,
            Error::Resolve(_) => 422,

            Error::Update(_) => 502,
            Error::Network(_) => 502,

            Error::ShuttingDown => 503,
            Error::ExternalTool(_) => 503,

            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Download(e) => match e {
                DownloadError::NotFound { .. } => "job_not_found",
                DownloadError::InvalidState { .. } => "invalid_state",
                DownloadError::ParametersUnavailable { .. } => "parameters_unavailable",
            },
            Error::Resolve(e) => match e {
                ResolveError::BlockedAccess => "blocked_access",
                ResolveError::MembersOnly => "members_only",
                ResolveError::Private => "private",
                ResolveError::LoginRequired => "login_required",
                ResolveError::Unavailable => "unavailable",
                ResolveError::AgeRestricted => "age_restricted",
                ResolveError::Copyright => "copyright",
                ResolveError::NoMetadata => "no_metadata",
                ResolveError::Engine(_) => "engine_error",
                ResolveError::Other(_) => "resolve_error",
            },
            Error::Update(e) => match e {
                UpdateError::InProgress => "update_in_progress",
                UpdateError::NoRelease => "no_release",
                UpdateError::AssetMissing { .. } => "asset_missing",
                UpdateError::DownloadFailed { .. } => "update_download_failed",
                UpdateError::ChecksumMismatch { .. } => "checksum_mismatch",
                UpdateError::ReplaceFailed(_) => "replace_failed",
            },
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ExternalTool(_) => "external_tool_error",
            Error::NotFound(_) => "not_found",
            Error::ShuttingDown => "shutting_down",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Download(DownloadError::NotFound { id })
            | Error::Download(DownloadError::ParametersUnavailable { id }) => {
                Some(serde_json::json!({ "job_id": id }))
            }
            Error::Download(DownloadError::InvalidState {
                id,
                operation,
                current_state,
            }) => Some(serde_json::json!({
                "job_id": id,
                "operation": operation,
                "current_state": current_state,
            })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({ "key": key })),
            Error::Update(UpdateError::AssetMissing { version, asset }) => {
                Some(serde_json::json!({ "version": version, "asset": asset }))
            }
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_not_found_maps_to_404() {
        let error = Error::Download(DownloadError::NotFound { id: 7 });
        assert_eq!(error.status_code(), 404);
        assert_eq!(error.error_code(), "job_not_found");
    }

    #[test]
    fn test_invalid_state_maps_to_conflict() {
        let error = Error::Download(DownloadError::InvalidState {
            id: 3,
            operation: "pause".to_string(),
            current_state: "Completed".to_string(),
        });
        assert_eq!(error.status_code(), 409);

        let api_error: ApiError = error.into();
        assert_eq!(api_error.error.code, "invalid_state");
        let details = api_error.error.details.unwrap();
        assert_eq!(details["job_id"], 3);
        assert_eq!(details["operation"], "pause");
    }

    #[test]
    fn test_resolve_errors_are_unprocessable_except_engine_failures() {
        assert_eq!(Error::Resolve(ResolveError::Private).status_code(), 422);
        assert_eq!(
            Error::Resolve(ResolveError::Engine("spawn failed".into())).status_code(),
            503
        );
    }

    #[test]
    fn test_resolve_error_display_is_user_facing() {
        assert_eq!(
            ResolveError::MembersOnly.to_string(),
            "This video requires channel membership"
        );
        assert_eq!(
            ResolveError::Other("boom".to_string()).to_string(),
            "boom"
        );
    }

    #[test]
    fn test_update_in_progress_is_conflict() {
        let error = Error::Update(UpdateError::InProgress);
        assert_eq!(error.status_code(), 409);
        assert_eq!(error.error_code(), "update_in_progress");
    }

    #[test]
    fn test_api_error_serializes_without_empty_details() {
        let api_error = ApiError::validation("bad url");
        let json = serde_json::to_value(&api_error).unwrap();
        assert_eq!(json["error"]["code"], "validation_error");
        assert!(json["error"].get("details").is_none());
    }
}
