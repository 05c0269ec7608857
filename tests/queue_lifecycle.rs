//! End-to-end queue lifecycle through the public API
//!
//! Installs the engine through the updater, resolves URLs, runs them through the
//! worker pool and shuts down.

#![cfg(unix)]
// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{collect_events_until, downloader_with_engine, downloader_without_engine, wait_for_status};
use media_dl::{Error, Event, ItemDescriptor, Status};

#[tokio::test]
async fn test_install_resolve_download_shutdown() {
    let (downloader, _temp_dir) = downloader_without_engine(2, "2024.08.06").await;
    assert!(!downloader.engine().is_available());

    assert!(downloader.ensure_engine().await.unwrap());
    assert_eq!(
        downloader.engine_version().await.as_deref(),
        Some("2024.08.06")
    );

    let mut events = downloader.subscribe();
    let ids = downloader
        .add_url("https://media.test/watch?v=one")
        .await
        .unwrap();
    assert_eq!(ids.len(), 1);

    let params = downloader.default_launch_params().await;
    assert_eq!(downloader.start_all(params).await.unwrap(), ids);

    let info = wait_for_status(&downloader, ids[0], Status::Completed).await;
    assert_eq!(
        info.output_path.unwrap().to_string_lossy(),
        "https://media.test/watch?v=one.mp4"
    );

    let seen = collect_events_until(&mut events, |seen| {
        seen.iter().any(|e| matches!(e, Event::Completed { .. }))
    })
    .await;
    let kinds: Vec<&str> = seen
        .iter()
        .filter(|e| e.job_id() == Some(ids[0]))
        .map(Event::kind)
        .filter(|k| *k != "progress")
        .collect();
    assert_eq!(kinds, vec!["queued", "started", "completed"]);

    downloader.shutdown().await.unwrap();
    let err = downloader
        .enqueue(ItemDescriptor::new("https://media.test/watch?v=two", "Two"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ShuttingDown));
}

#[tokio::test]
async fn test_failed_job_can_be_retried() {
    let (downloader, _temp_dir) = downloader_with_engine(1, "2024.08.06").await;

    let id = downloader
        .enqueue(ItemDescriptor::new("https://media.test/fail", "Broken"))
        .await
        .unwrap();
    let params = downloader.default_launch_params().await;
    downloader.start(id, params).await.unwrap();

    let failed = wait_for_status(&downloader, id, Status::Failed).await;
    assert!(failed.error.unwrap().contains("Unsupported URL"));
    assert!(!failed.blocked_access);

    downloader.retry(id).await.unwrap();
    let failed_again = wait_for_status(&downloader, id, Status::Failed).await;
    assert_eq!(failed_again.attempt, 2);

    let stats = downloader.stats().await.unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.capacity, 1);
}

#[tokio::test]
async fn test_update_check_reports_installed_version() {
    let (downloader, _temp_dir) = downloader_with_engine(1, "2024.08.06").await;

    let check = downloader.check_update().await.unwrap();
    assert_eq!(check.current.as_deref(), Some("2024.08.06"));
    assert!(!check.available);
}
