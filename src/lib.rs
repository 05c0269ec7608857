//! # media-dl
//!
//! Queue-driven backend library for media download applications that delegate
//! the actual fetching to an external engine (yt-dlp).
//!
//! ## Design Philosophy
//!
//! media-dl is designed to be:
//! - **Bounded** - A fixed pool of worker slots limits how many engine processes run at once
//! - **Controllable** - Every job can be paused, resumed, cancelled and retried
//! - **Library-first** - No UI, purely a Rust crate for embedding (plus an optional REST API)
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dl::{Config, MediaDownloader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = MediaDownloader::new(Config::default()).await?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Resolve a URL (single item or playlist) into pending jobs and start them
//!     downloader.add_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ").await?;
//!     let params = downloader.default_launch_params().await;
//!     downloader.start_all(params).await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Credential record (cookie jar location and cached login state)
pub mod auth;
/// Configuration types
pub mod config;
/// Job registry, worker pool and lifecycle control
pub mod downloader;
/// External fetch engine: argument building, process running, metadata resolution
pub mod engine;
/// Error types
pub mod error;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;
/// Engine binary version tracking and self-update
pub mod updater;

// Re-export commonly used types
pub use config::Config;
pub use downloader::MediaDownloader;
pub use engine::resolver::{Resolution, ResolvedCollection, ResolvedItem};
pub use error::{
    ApiError, DownloadError, Error, ErrorDetail, ResolveError, Result, ToHttpStatus, UpdateError,
};
pub use types::{
    Event, ItemDescriptor, JobId, JobInfo, LaunchParams, Progress, ProgressStage, QueueStats,
    Status,
};
pub use updater::{BinaryManager, HttpReleaseFeed, ReleaseFeed, UpdateCheck, UpdateOutcome};

/// Wait for SIGTERM or Ctrl+C, then shut the downloader down.
///
/// Jobs still running when the signal arrives end up `Paused` with their launch
/// parameters, so a later session can resume them.
///
/// # Example
///
/// ```no_run
/// use media_dl::{MediaDownloader, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = MediaDownloader::new(Config::default()).await?;
///     run_with_shutdown(downloader).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: MediaDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments; Ctrl+C still works there
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::warn!(error = %e, "could not register SIGTERM handler");
            wait_for_ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        _ = wait_for_ctrl_c() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received Ctrl+C"),
        Err(e) => {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}
