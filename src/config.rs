//! Configuration types for media-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, path::PathBuf, time::Duration};

/// Queue and download behavior (directories, concurrency, defaults)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Download directory (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Maximum jobs holding a live engine process at once (default: 3)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Format selector used when the caller does not choose one (default: "bv*+ba/b")
    #[serde(default = "default_format")]
    pub default_format: String,

    /// Container the engine merges separate video/audio streams into (default: "mp4")
    #[serde(default = "default_merge_format")]
    pub merge_output_format: String,

    /// Engine output filename template, relative to the output directory
    #[serde(default = "default_output_template")]
    pub output_template: String,

    /// Window in which repeated blocked-access failures do not re-notify (default: 5 seconds)
    #[serde(default = "default_blocked_cooldown", with = "duration_serde")]
    pub blocked_access_cooldown: Duration,

    /// Capacity of the event broadcast channel (default: 1000)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            max_concurrent_downloads: default_max_concurrent(),
            default_format: default_format(),
            merge_output_format: default_merge_format(),
            output_template: default_output_template(),
            blocked_access_cooldown: default_blocked_cooldown(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// External fetch engine invocation settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Explicit engine binary (takes precedence over the managed install and PATH)
    #[serde(default)]
    pub binary_path: Option<PathBuf>,

    /// Whether to search PATH for `yt-dlp` when no managed binary exists (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Client identity sent with every request to reduce anti-automation blocking
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Request retry count passed to the engine (default: 10)
    #[serde(default = "default_engine_retries")]
    pub retries: u32,

    /// Fragment retry count passed to the engine (default: 10)
    #[serde(default = "default_engine_retries")]
    pub fragment_retries: u32,

    /// Extractor retry count passed to the engine (default: 5)
    #[serde(default = "default_extractor_retries")]
    pub extractor_retries: u32,

    /// Socket timeout passed to the engine (default: 30 seconds)
    #[serde(default = "default_socket_timeout", with = "duration_serde")]
    pub socket_timeout: Duration,

    /// Upper bound for a metadata-only resolve run (default: 120 seconds)
    #[serde(default = "default_resolve_timeout", with = "duration_serde")]
    pub resolve_timeout: Duration,

    /// Prefix joined with an entry id when a collection entry carries no URL
    #[serde(default = "default_fallback_url_prefix")]
    pub fallback_url_prefix: String,

    /// Number of trailing output lines kept for failure diagnostics (default: 20)
    #[serde(default = "default_diagnostic_lines")]
    pub diagnostic_lines: usize,

    /// Maximum length of a failure message surfaced to callers (default: 300)
    #[serde(default = "default_max_error_len")]
    pub max_error_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary_path: None,
            search_path: true,
            user_agent: default_user_agent(),
            retries: default_engine_retries(),
            fragment_retries: default_engine_retries(),
            extractor_retries: default_extractor_retries(),
            socket_timeout: default_socket_timeout(),
            resolve_timeout: default_resolve_timeout(),
            fallback_url_prefix: default_fallback_url_prefix(),
            diagnostic_lines: default_diagnostic_lines(),
            max_error_len: default_max_error_len(),
        }
    }
}

/// Engine self-update settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Release feed returning the latest release descriptor (GitHub releases API format)
    #[serde(default = "default_release_feed_url")]
    pub release_feed_url: String,

    /// Directory holding the managed engine binary (default: "./engine")
    #[serde(default = "default_install_dir")]
    pub install_dir: PathBuf,

    /// Release asset to install (default: platform specific)
    #[serde(default = "default_asset_name")]
    pub asset_name: String,

    /// Verify the asset against the release's SHA2-256SUMS file when present (default: true)
    #[serde(default = "default_true")]
    pub verify_checksum: bool,

    /// Timeout for the release feed request (default: 30 seconds)
    #[serde(default = "default_feed_timeout", with = "duration_serde")]
    pub feed_timeout: Duration,

    /// Timeout for downloading a release asset (default: 120 seconds)
    #[serde(default = "default_asset_timeout", with = "duration_serde")]
    pub download_timeout: Duration,

    /// Timeout for querying the installed binary's version (default: 10 seconds)
    #[serde(default = "default_version_timeout", with = "duration_serde")]
    pub version_timeout: Duration,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            release_feed_url: default_release_feed_url(),
            install_dir: default_install_dir(),
            asset_name: default_asset_name(),
            verify_checksum: true,
            feed_timeout: default_feed_timeout(),
            download_timeout: default_asset_timeout(),
            version_timeout: default_version_timeout(),
        }
    }
}

impl UpdateConfig {
    /// File name of the managed engine binary
    pub fn binary_name(&self) -> &'static str {
        if cfg!(windows) { "yt-dlp.exe" } else { "yt-dlp" }
    }

    /// Canonical path of the managed engine binary
    pub fn managed_binary(&self) -> PathBuf {
        self.install_dir.join(self.binary_name())
    }
}

/// Local state files (best-effort caches)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Directory for the credential record, cookie jar and version marker (default: "./data")
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl PersistenceConfig {
    /// Netscape-format cookie jar supplied by the credential collaborator
    pub fn cookies_file(&self) -> PathBuf {
        self.data_dir.join("cookies.txt")
    }

    /// Cached login state record
    pub fn auth_file(&self) -> PathBuf {
        self.data_dir.join("auth.json")
    }

    /// Single-line marker holding the last installed engine version
    pub fn version_marker(&self) -> PathBuf {
        self.data_dir.join(".engine_version")
    }
}

/// Retry configuration for network calls to the release feed
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:6790)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Optional API key for authentication
    #[serde(default)]
    pub api_key: Option<String>,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_key: None,
            cors_enabled: true,
            cors_origins: default_cors_origins(),
        }
    }
}

/// Main configuration for MediaDownloader
///
/// Every section has working defaults, so `Config::default()` is a usable configuration
/// as long as the engine can be found (or installed through the updater).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Queue and download behavior
    #[serde(default)]
    pub download: DownloadConfig,

    /// Engine invocation settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Engine self-update settings
    #[serde(default)]
    pub update: UpdateConfig,

    /// Local state files
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Retry policy for release feed requests
    #[serde(default)]
    pub retry: RetryConfig,

    /// REST API settings
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Load a configuration from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the downloader cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.download.max_concurrent_downloads == 0 {
            return Err(Error::Config {
                message: "max_concurrent_downloads must be at least 1".to_string(),
                key: Some("max_concurrent_downloads".to_string()),
            });
        }
        if self.download.event_buffer == 0 {
            return Err(Error::Config {
                message: "event_buffer must be at least 1".to_string(),
                key: Some("event_buffer".to_string()),
            });
        }
        if self.download.default_format.trim().is_empty() {
            return Err(Error::Config {
                message: "default_format cannot be empty".to_string(),
                key: Some("default_format".to_string()),
            });
        }
        if self.update.asset_name.trim().is_empty() {
            return Err(Error::Config {
                message: "asset_name cannot be empty".to_string(),
                key: Some("asset_name".to_string()),
            });
        }
        Ok(())
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_max_concurrent() -> usize {
    3
}

fn default_format() -> String {
    "bv*+ba/b".to_string()
}

fn default_merge_format() -> String {
    "mp4".to_string()
}

fn default_output_template() -> String {
    "%(title)s.%(ext)s".to_string()
}

fn default_blocked_cooldown() -> Duration {
    Duration::from_secs(5)
}

fn default_event_buffer() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_engine_retries() -> u32 {
    10
}

fn default_extractor_retries() -> u32 {
    5
}

fn default_socket_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_resolve_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_fallback_url_prefix() -> String {
    "https://www.youtube.com/watch?v=".to_string()
}

fn default_diagnostic_lines() -> usize {
    20
}

fn default_max_error_len() -> usize {
    300
}

fn default_release_feed_url() -> String {
    "https://api.github.com/repos/yt-dlp/yt-dlp/releases/latest".to_string()
}

fn default_install_dir() -> PathBuf {
    PathBuf::from("./engine")
}

fn default_asset_name() -> String {
    if cfg!(windows) {
        "yt-dlp.exe".to_string()
    } else if cfg!(target_os = "macos") {
        "yt-dlp_macos".to_string()
    } else {
        "yt-dlp_linux".to_string()
    }
}

fn default_feed_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_asset_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_version_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6790))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
