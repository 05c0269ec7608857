//! Engine binary version tracking and self-update
//!
//! Updates are two-phase: the new binary is downloaded next to the managed one as
//! `<name>.tmp`, verified, and only then renamed over it. A failure at any point removes
//! the temporary file and leaves the installed binary untouched.

use crate::config::{Config, RetryConfig, UpdateConfig};
use crate::engine::Engine;
use crate::error::{Error, Result, UpdateError};
use crate::retry::download_with_retry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::process::Command;

pub mod checksum;
pub mod feed;

pub use feed::{HttpReleaseFeed, Release, ReleaseAsset, ReleaseFeed};

/// Latest release as seen by this platform
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    /// Version without a leading `v`
    pub version: String,
    /// Name of the platform asset
    pub asset_name: String,
    /// Download URL of the platform asset; `None` when the release lacks it
    pub download_url: Option<String>,
    /// URL of the release's checksum listing, if published
    pub checksums_url: Option<String>,
}

/// Result of comparing the installed version with the latest release
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCheck {
    /// Installed version, if the binary could be queried
    pub current: Option<String>,
    /// Latest published version
    pub latest: Option<String>,
    /// Whether `latest` is newer than `current`
    pub available: bool,
}

/// What [`BinaryManager::update`] did
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum UpdateOutcome {
    /// Already on the latest version; nothing was downloaded
    UpToDate {
        /// Installed version
        version: String,
    },
    /// A new binary was installed
    Updated {
        /// Version before the update
        previous: Option<String>,
        /// Installed version
        version: String,
    },
}

/// Whether `latest` is newer than `current`
///
/// Versions are date-based and fixed-width (`2024.03.05`), so string order is version
/// order. A missing current version is always older.
pub fn is_newer(latest: &str, current: Option<&str>) -> bool {
    match current {
        Some(current) => latest > current,
        None => true,
    }
}

/// Resets the in-progress flag when an update ends by any path
struct UpdateGuard<'a>(&'a AtomicBool);

impl Drop for UpdateGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Manages the engine binary: version queries, release checks and replacement
pub struct BinaryManager {
    engine: Engine,
    update: UpdateConfig,
    retry: RetryConfig,
    version_marker: PathBuf,
    feed: Arc<dyn ReleaseFeed>,
    updating: AtomicBool,
}

impl BinaryManager {
    /// Create a manager using the given release feed
    pub fn new(config: &Config, engine: Engine, feed: Arc<dyn ReleaseFeed>) -> Self {
        Self {
            engine,
            update: config.update.clone(),
            retry: config.retry.clone(),
            version_marker: config.persistence.version_marker(),
            feed,
            updating: AtomicBool::new(false),
        }
    }

    /// Whether an update is currently running
    pub fn is_updating(&self) -> bool {
        self.updating.load(Ordering::SeqCst)
    }

    /// Version reported by `<binary> --version`, or `None` if it cannot be run
    pub async fn installed_version(&self) -> Option<String> {
        let binary = self.engine.binary();
        if !binary.is_file() {
            return None;
        }

        let output = tokio::time::timeout(
            self.update.version_timeout,
            Command::new(&binary)
                .arg("--version")
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await;

        match output {
            Ok(Ok(output)) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
                (!version.is_empty()).then_some(version)
            }
            Ok(Ok(output)) => {
                tracing::debug!(status = ?output.status.code(), "engine --version failed");
                None
            }
            Ok(Err(e)) => {
                tracing::debug!(error = %e, binary = %binary.display(), "could not run engine");
                None
            }
            Err(_) => {
                tracing::warn!(binary = %binary.display(), "engine --version timed out");
                None
            }
        }
    }

    /// Version recorded by the last successful update (best-effort cache)
    pub async fn recorded_version(&self) -> Option<String> {
        tokio::fs::read_to_string(&self.version_marker)
            .await
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Latest release for this platform
    pub async fn latest_release(&self) -> Result<Option<ReleaseInfo>> {
        let feed = self.feed.clone();
        let release = download_with_retry(&self.retry, || {
            let feed = feed.clone();
            async move { feed.latest().await }
        })
        .await?;

        let version = release.tag.trim().trim_start_matches('v').to_string();
        if version.is_empty() {
            return Ok(None);
        }

        let asset_name = self.update.asset_name.clone();
        let download_url = release.asset(&asset_name).map(|a| a.url.clone());
        if download_url.is_none() {
            tracing::warn!(version = %version, asset = %asset_name, "release has no asset for this platform");
        }

        Ok(Some(ReleaseInfo {
            version,
            download_url,
            checksums_url: release.asset(checksum::SUMS_ASSET).map(|a| a.url.clone()),
            asset_name,
        }))
    }

    /// Compare the installed version with the latest release
    pub async fn check_update(&self) -> Result<UpdateCheck> {
        let current = self.installed_version().await;
        let latest = self.latest_release().await?.map(|r| r.version);
        let available = latest
            .as_deref()
            .is_some_and(|latest| is_newer(latest, current.as_deref()));

        Ok(UpdateCheck {
            current,
            latest,
            available,
        })
    }

    /// Install the latest release if it is newer than the installed binary
    ///
    /// Rejected with [`UpdateError::InProgress`] while another update runs.
    pub async fn update(&self) -> Result<UpdateOutcome> {
        self.update_with(|_| {}).await
    }

    /// Like [`update`](Self::update), calling `on_start` with the new version once the
    /// release is known to be newer, before anything is downloaded
    pub async fn update_with(&self, on_start: impl FnOnce(&str)) -> Result<UpdateOutcome> {
        if self
            .updating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(UpdateError::InProgress.into());
        }
        let _guard = UpdateGuard(&self.updating);

        let current = self.installed_version().await;
        let release = self
            .latest_release()
            .await?
            .ok_or(UpdateError::NoRelease)?;

        if !is_newer(&release.version, current.as_deref()) {
            tracing::info!(version = %release.version, "engine is up to date");
            return Ok(UpdateOutcome::UpToDate {
                version: current.unwrap_or(release.version),
            });
        }

        let url = release
            .download_url
            .clone()
            .ok_or_else(|| UpdateError::AssetMissing {
                version: release.version.clone(),
                asset: release.asset_name.clone(),
            })?;

        let target = self.engine.update_target().to_path_buf();
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = sibling_with_suffix(&target, ".tmp");

        on_start(&release.version);
        tracing::info!(
            from = ?current,
            to = %release.version,
            path = %target.display(),
            "updating engine"
        );

        if let Err(e) = self.install(&release, &url, &staging, &target).await {
            remove_if_present(&staging).await;
            tracing::error!(error = %e, "engine update failed, previous binary kept");
            return Err(e);
        }

        self.write_marker(&release.version).await;
        tracing::info!(version = %release.version, "engine updated");

        Ok(UpdateOutcome::Updated {
            previous: current,
            version: release.version,
        })
    }

    /// Install the engine if no binary can be found; returns whether it installed one
    pub async fn ensure_installed(&self) -> Result<bool> {
        if self.engine.is_available() {
            return Ok(false);
        }
        tracing::info!(path = %self.engine.update_target().display(), "engine not found, installing");
        self.update().await?;
        Ok(true)
    }

    async fn install(
        &self,
        release: &ReleaseInfo,
        url: &str,
        staging: &Path,
        target: &Path,
    ) -> Result<()> {
        let feed = self.feed.clone();
        download_with_retry(&self.retry, || {
            let feed = feed.clone();
            async move { feed.download(url, staging).await }
        })
        .await
        .map_err(|e| match e {
            Error::Update(update) => Error::Update(update),
            other => UpdateError::DownloadFailed {
                url: url.to_string(),
                reason: other.to_string(),
            }
            .into(),
        })?;

        if self.update.verify_checksum {
            self.verify_checksum(release, staging).await?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(staging, std::fs::Permissions::from_mode(0o755))
                .await
                .map_err(|e| UpdateError::ReplaceFailed(format!("chmod failed: {}", e)))?;
        }

        tokio::fs::rename(staging, target)
            .await
            .map_err(|e| UpdateError::ReplaceFailed(e.to_string()))?;
        Ok(())
    }

    async fn verify_checksum(&self, release: &ReleaseInfo, staging: &Path) -> Result<()> {
        let Some(sums_url) = &release.checksums_url else {
            tracing::warn!(version = %release.version, "release publishes no checksums, skipping verification");
            return Ok(());
        };

        let sums_path = sibling_with_suffix(staging, ".sums");
        let fetched = self.feed.download(sums_url, &sums_path).await;
        let listing = match fetched {
            Ok(()) => tokio::fs::read_to_string(&sums_path).await,
            Err(e) => {
                remove_if_present(&sums_path).await;
                return Err(e);
            }
        };
        remove_if_present(&sums_path).await;
        let listing = listing?;

        match checksum::expected_digest(&listing, &release.asset_name) {
            Some(expected) => checksum::verify(staging, &release.asset_name, &expected).await,
            None => {
                tracing::warn!(asset = %release.asset_name, "asset missing from checksum listing");
                Ok(())
            }
        }
    }

    async fn write_marker(&self, version: &str) {
        if let Some(parent) = self.version_marker.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            tracing::warn!(error = %e, "could not create data directory for version marker");
            return;
        }
        if let Err(e) = tokio::fs::write(&self.version_marker, format!("{}\n", version)).await {
            tracing::warn!(error = %e, path = %self.version_marker.display(), "could not write version marker");
        }
    }
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

async fn remove_if_present(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(error = %e, path = %path.display(), "could not remove temporary file"),
    }
}
