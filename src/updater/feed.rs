//! Release feed access

use crate::config::UpdateConfig;
use crate::error::{Error, Result, UpdateError};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// One published release (GitHub releases API shape)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Version tag, possibly prefixed with `v`
    #[serde(rename = "tag_name")]
    pub tag: String,
    /// Downloadable files
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// A named downloadable file of a release
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    /// File name
    pub name: String,
    /// Direct download URL
    #[serde(rename = "browser_download_url")]
    pub url: String,
}

impl Release {
    /// Asset with exactly this name
    pub fn asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|asset| asset.name == name)
    }
}

/// Source of engine releases
///
/// Abstracted so the update procedure can be exercised against injected failures.
#[async_trait]
pub trait ReleaseFeed: Send + Sync {
    /// Fetch the latest release descriptor
    async fn latest(&self) -> Result<Release>;

    /// Download `url` into `dest`, creating or truncating it
    async fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

/// [`ReleaseFeed`] backed by an HTTP release API
#[derive(Clone, Debug)]
pub struct HttpReleaseFeed {
    client: reqwest::Client,
    feed_url: String,
    feed_timeout: Duration,
    download_timeout: Duration,
}

impl HttpReleaseFeed {
    /// Create a feed client from the update settings
    pub fn new(config: &UpdateConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("media-dl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            feed_url: config.release_feed_url.clone(),
            feed_timeout: config.feed_timeout,
            download_timeout: config.download_timeout,
        })
    }
}

#[async_trait]
impl ReleaseFeed for HttpReleaseFeed {
    async fn latest(&self) -> Result<Release> {
        let release = self
            .client
            .get(&self.feed_url)
            .timeout(self.feed_timeout)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?
            .error_for_status()?
            .json::<Release>()
            .await?;
        tracing::debug!(tag = %release.tag, assets = release.assets.len(), "fetched release feed");
        Ok(release)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self
            .client
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .await?
            .error_for_status()?;
        let expected = response.content_length();

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;

        if let Some(expected) = expected
            && written != expected
        {
            return Err(UpdateError::DownloadFailed {
                url: url.to_string(),
                reason: format!("incomplete transfer: {} of {} bytes", written, expected),
            }
            .into());
        }
        Ok(())
    }
}
