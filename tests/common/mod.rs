//! Common helpers for media-dl integration tests
//!
//! Downloaders here run against a shell script standing in for the engine, installed
//! through the public release-feed seam.

#![allow(dead_code)]

use async_trait::async_trait;
use media_dl::updater::{Release, ReleaseAsset};
use media_dl::{Config, Event, JobId, JobInfo, MediaDownloader, ReleaseFeed, Status};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

/// Minimal engine: prints its version, describes a single video, and downloads
/// by reporting progress. URLs containing `fail` fail the download.
pub fn engine_script(version: &str) -> String {
    format!(
        r#"#!/bin/sh
for last; do :; done
if [ "$1" = "--version" ]; then
    echo {version}
    exit 0
fi
case "$*" in
    *--flat-playlist*)
        echo "{{\"id\":\"x\",\"title\":\"Video\",\"webpage_url\":\"$last\"}}"
        exit 0
        ;;
esac
case "$last" in
    *fail*)
        echo "ERROR: Unsupported URL: $last" >&2
        exit 1
        ;;
esac
echo "MDL| 25.0%|1.00MiB/s|00:03"
echo "MDL|100.0%|1.00MiB/s|00:00"
echo "MDL-FILE|$last.mp4"
exit 0
"#
    )
}

/// Release feed that serves [`engine_script`]
pub struct ScriptFeed {
    pub version: String,
}

#[async_trait]
impl ReleaseFeed for ScriptFeed {
    async fn latest(&self) -> media_dl::Result<Release> {
        Ok(Release {
            tag: self.version.clone(),
            assets: vec![ReleaseAsset {
                name: "yt-dlp_linux".to_string(),
                url: "mem://yt-dlp_linux".to_string(),
            }],
        })
    }

    async fn download(&self, _url: &str, dest: &Path) -> media_dl::Result<()> {
        tokio::fs::write(dest, engine_script(&self.version)).await?;
        Ok(())
    }
}

/// Config rooted in `dir` that only uses the managed engine binary
pub fn test_config(dir: &Path, capacity: usize) -> Config {
    let mut config = Config::default();
    config.download.download_dir = dir.join("downloads");
    config.download.max_concurrent_downloads = capacity;
    config.update.install_dir = dir.join("engine");
    config.update.asset_name = "yt-dlp_linux".to_string();
    config.persistence.data_dir = dir.join("data");
    config.engine.search_path = false;
    config
}

/// Downloader with no engine installed yet; the feed offers `version`
pub async fn downloader_without_engine(
    capacity: usize,
    version: &str,
) -> (MediaDownloader, TempDir) {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp_dir.path(), capacity);
    let feed = Arc::new(ScriptFeed {
        version: version.to_string(),
    });
    let downloader = MediaDownloader::with_release_feed(config, feed)
        .await
        .expect("downloader");
    (downloader, temp_dir)
}

/// Downloader with the engine already installed at `installed`
pub async fn downloader_with_engine(capacity: usize, installed: &str) -> (MediaDownloader, TempDir) {
    let (downloader, temp_dir) = downloader_without_engine(capacity, installed).await;
    let binary = downloader.get_config().update.managed_binary();
    std::fs::create_dir_all(binary.parent().expect("parent")).expect("mkdir");
    std::fs::write(&binary, engine_script(installed)).expect("write engine");
    std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    (downloader, temp_dir)
}

/// Poll until the job reaches `status`
pub async fn wait_for_status(downloader: &MediaDownloader, id: JobId, status: Status) -> JobInfo {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let info = downloader.get(id).await.expect("get").expect("job exists");
            if info.status == status {
                return info;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("job {id} never reached {status:?}"))
}

/// Collect events until `done` returns true
pub async fn collect_events_until(
    events: &mut broadcast::Receiver<Event>,
    done: impl Fn(&[Event]) -> bool,
) -> Vec<Event> {
    let mut seen = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done(&seen) {
            match events.recv().await {
                Ok(event) => seen.push(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
    .await
    .expect("timed out collecting events");
    seen
}
