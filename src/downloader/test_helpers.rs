//! Shared test helpers for creating MediaDownloader instances backed by a fake engine.

use crate::config::Config;
use crate::downloader::MediaDownloader;
use crate::error::Result;
use crate::types::{Event, JobId, JobInfo, LaunchParams, Status};
use crate::updater::{Release, ReleaseAsset, ReleaseFeed};
use async_trait::async_trait;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::{TempDir, tempdir};
use tokio::sync::broadcast;

/// Version printed by the engine installed by [`create_test_downloader`]
pub(crate) const INSTALLED_VERSION: &str = "2024.01.10";

/// Shell script standing in for yt-dlp
///
/// The URL (always the last argument) selects the behavior:
/// - metadata mode: URLs containing `playlist` list three entries, `private` fails,
///   anything else describes a single video
/// - `gate=<path>`: waits until `<path>` exists before doing anything else
/// - `blocked`: fails with an HTTP 403 error
/// - `fail`: fails with an unsupported-URL error
/// - `slow`: reports 5% and then hangs until killed
/// - anything else: reports progress and completes immediately
pub(crate) fn fake_engine_script(version: &str) -> String {
    format!(
        r#"#!/bin/sh
for last; do :; done
url="$last"
if [ "$1" = "--version" ]; then
    echo {version}
    exit 0
fi
case "$*" in
    *--flat-playlist*)
        case "$url" in
            *private*)
                echo "ERROR: [youtube] abc: Private video. Sign in if you've been granted access" >&2
                exit 1
                ;;
            *playlist*)
                for n in 1 2 3; do
                    echo "{{\"_type\":\"url\",\"id\":\"vid$n\",\"title\":\"Entry $n\",\"url\":\"https://media.test/watch?v=vid$n\",\"playlist_title\":\"Test list\"}}"
                done
                ;;
            *)
                echo "{{\"id\":\"single\",\"title\":\"Single video\",\"webpage_url\":\"$url\"}}"
                ;;
        esac
        exit 0
        ;;
esac
case "$url" in
    *gate=*)
        gate="${{url##*gate=}}"
        while [ ! -e "$gate" ]; do sleep 0.05; done
        ;;
esac
case "$url" in
    *blocked*)
        echo "ERROR: unable to download video data: HTTP Error 403: Forbidden" >&2
        exit 1
        ;;
    *fail*)
        echo "ERROR: Unsupported URL: $url" >&2
        exit 1
        ;;
    *slow*)
        echo "MDL|  5.0%|1.00MiB/s|00:10"
        exec sleep 30
        ;;
esac
echo "MDL| 50.0%|2.00MiB/s|00:01"
echo "MDL|100.0%|2.00MiB/s|00:00"
echo "MDL-FILE|/downloads/out.mp4"
exit 0
"#
    )
}

/// Write an executable fake engine to `path`
pub(crate) fn install_fake_engine(path: &Path, version: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, fake_engine_script(version)).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// Configuration rooted in `dir` with the engine at its managed location
pub(crate) fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = dir.join("downloads");
    config.download.max_concurrent_downloads = 3;
    config.download.blocked_access_cooldown = Duration::from_secs(5);
    config.update.install_dir = dir.join("engine");
    config.update.asset_name = "yt-dlp_linux".to_string();
    config.persistence.data_dir = dir.join("data");
    config.engine.search_path = false;
    config.retry.max_attempts = 0;
    config.retry.initial_delay = Duration::from_millis(1);
    config.retry.jitter = false;
    config
}

/// Release feed serving a fake engine that reports `version`
pub(crate) struct StaticFeed {
    pub(crate) version: String,
    /// Number of `latest` requests served
    pub(crate) requests: AtomicUsize,
}

impl StaticFeed {
    pub(crate) fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            requests: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ReleaseFeed for StaticFeed {
    async fn latest(&self) -> Result<Release> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(Release {
            tag: self.version.clone(),
            assets: vec![ReleaseAsset {
                name: "yt-dlp_linux".to_string(),
                url: "mem://yt-dlp_linux".to_string(),
            }],
        })
    }

    async fn download(&self, _url: &str, dest: &Path) -> Result<()> {
        tokio::fs::write(dest, fake_engine_script(&self.version)).await?;
        Ok(())
    }
}

/// Helper to create a test MediaDownloader with a working fake engine.
/// Returns the downloader and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader() -> (MediaDownloader, TempDir) {
    create_test_downloader_with(|_| {}).await
}

/// Like [`create_test_downloader`], with a chance to adjust the configuration
pub(crate) async fn create_test_downloader_with(
    adjust: impl FnOnce(&mut Config),
) -> (MediaDownloader, TempDir) {
    let (downloader, _feed, temp_dir) = create_test_downloader_with_feed(adjust).await;
    (downloader, temp_dir)
}

/// Like [`create_test_downloader_with`], also returning the release feed
pub(crate) async fn create_test_downloader_with_feed(
    adjust: impl FnOnce(&mut Config),
) -> (MediaDownloader, Arc<StaticFeed>, TempDir) {
    let temp_dir = tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    adjust(&mut config);
    install_fake_engine(&config.update.managed_binary(), INSTALLED_VERSION);

    let feed = Arc::new(StaticFeed::new("2024.08.06"));
    let downloader = MediaDownloader::with_release_feed(config, feed.clone())
        .await
        .unwrap();
    (downloader, feed, temp_dir)
}

/// Launch parameters writing into the test download directory
pub(crate) fn params(dir: &Path) -> LaunchParams {
    LaunchParams {
        format_spec: "bv*+ba/b".to_string(),
        output_dir: dir.join("downloads"),
        credential_ref: None,
    }
}

/// URL whose download blocks until [`open_gate`] is called with the returned path
pub(crate) fn gated_url(dir: &Path, name: &str) -> (String, PathBuf) {
    gated(dir, "gated", name)
}

/// Gated URL that fails with blocked access once the gate opens
pub(crate) fn gated_blocked_url(dir: &Path, name: &str) -> (String, PathBuf) {
    gated(dir, "blocked", name)
}

fn gated(dir: &Path, kind: &str, name: &str) -> (String, PathBuf) {
    let gate = dir.join(format!("{name}.gate"));
    (format!("https://media.test/{kind}?gate={}", gate.display()), gate)
}

pub(crate) fn open_gate(gate: &Path) {
    std::fs::write(gate, b"open").unwrap();
}

/// Poll until the job reaches `status`, failing after five seconds
pub(crate) async fn wait_for_status(
    downloader: &MediaDownloader,
    id: JobId,
    status: Status,
) -> JobInfo {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let info = downloader.get(id).await.unwrap().unwrap();
        if info.status == status {
            return info;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {id} stuck in {:?}, expected {:?}",
            info.status,
            status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Next event matching `pred`, failing after five seconds
pub(crate) async fn next_event(
    events: &mut broadcast::Receiver<Event>,
    pred: impl Fn(&Event) -> bool,
) -> Event {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
