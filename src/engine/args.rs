//! Deterministic argument lists for the engine

use crate::config::{DownloadConfig, EngineConfig};
use crate::types::LaunchParams;
use std::path::Path;
use std::time::Duration;

use super::progress::{OUTPUT_FILE_TEMPLATE, PROGRESS_TEMPLATE};

const ACCEPT: &str = "Accept:text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "Accept-Language:en-us,en;q=0.5";
const SEC_FETCH_MODE: &str = "Sec-Fetch-Mode:navigate";

/// Invocation settings shared by every engine run
#[derive(Clone, Debug)]
pub struct ArgSettings {
    /// Client identity sent with each request
    pub user_agent: String,
    /// `--retries`
    pub retries: u32,
    /// `--fragment-retries`
    pub fragment_retries: u32,
    /// `--extractor-retries`
    pub extractor_retries: u32,
    /// `--socket-timeout`
    pub socket_timeout: Duration,
    /// `--merge-output-format`
    pub merge_output_format: String,
    /// Output filename template joined to the job's output directory
    pub output_template: String,
}

impl ArgSettings {
    /// Collect the invocation settings from configuration
    pub fn new(engine: &EngineConfig, download: &DownloadConfig) -> Self {
        Self {
            user_agent: engine.user_agent.clone(),
            retries: engine.retries,
            fragment_retries: engine.fragment_retries,
            extractor_retries: engine.extractor_retries,
            socket_timeout: engine.socket_timeout,
            merge_output_format: download.merge_output_format.clone(),
            output_template: download.output_template.clone(),
        }
    }

    fn push_identity(&self, args: &mut Vec<String>) {
        args.push("--user-agent".into());
        args.push(self.user_agent.clone());
        for header in [ACCEPT, ACCEPT_LANGUAGE, SEC_FETCH_MODE] {
            args.push("--add-header".into());
            args.push(header.into());
        }
    }

    fn push_network(&self, args: &mut Vec<String>) {
        args.push("--retries".into());
        args.push(self.retries.to_string());
        args.push("--extractor-retries".into());
        args.push(self.extractor_retries.to_string());
        args.push("--socket-timeout".into());
        args.push(self.socket_timeout.as_secs().to_string());
    }
}

/// Everything needed to start one download run
#[derive(Clone, Debug)]
pub struct DownloadRequest {
    /// URL handed to the engine
    pub source_url: String,
    /// Captured launch parameters
    pub params: LaunchParams,
}

/// Arguments for a download run, in a fixed order
pub fn download_args(settings: &ArgSettings, request: &DownloadRequest) -> Vec<String> {
    let output = request.params.output_dir.join(&settings.output_template);

    let mut args: Vec<String> = vec![
        "--newline".into(),
        "--progress".into(),
        "--progress-template".into(),
        PROGRESS_TEMPLATE.into(),
        "--print".into(),
        OUTPUT_FILE_TEMPLATE.into(),
        "--no-playlist".into(),
        "-o".into(),
        output.to_string_lossy().into_owned(),
        "-f".into(),
        request.params.format_spec.clone(),
        "--merge-output-format".into(),
        settings.merge_output_format.clone(),
    ];
    settings.push_identity(&mut args);
    settings.push_network(&mut args);
    args.push("--fragment-retries".into());
    args.push(settings.fragment_retries.to_string());
    push_cookies(&mut args, request.params.credential_ref.as_deref());
    args.push("--".into());
    args.push(request.source_url.clone());
    args
}

/// Arguments for a metadata-only run producing one JSON object per line
pub fn metadata_args(settings: &ArgSettings, url: &str, credential: Option<&Path>) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--flat-playlist".into(),
        "--dump-json".into(),
        "--ignore-errors".into(),
        "--no-warnings".into(),
    ];
    settings.push_identity(&mut args);
    settings.push_network(&mut args);
    push_cookies(&mut args, credential);
    args.push("--".into());
    args.push(url.to_string());
    args
}

/// Format selector capped at a maximum video height, or best available
pub fn format_for_height(max_height: Option<u32>) -> String {
    match max_height {
        Some(h) => format!("bv*[height<={h}]+ba/b[height<={h}]"),
        None => "bv*+ba/b".to_string(),
    }
}

fn push_cookies(args: &mut Vec<String>, credential: Option<&Path>) {
    if let Some(path) = credential {
        args.push("--cookies".into());
        args.push(path.to_string_lossy().into_owned());
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn settings() -> ArgSettings {
        ArgSettings::new(&EngineConfig::default(), &DownloadConfig::default())
    }

    fn request(credential: Option<&str>) -> DownloadRequest {
        DownloadRequest {
            source_url: "https://www.youtube.com/watch?v=abc".to_string(),
            params: LaunchParams {
                format_spec: format_for_height(Some(720)),
                output_dir: PathBuf::from("/tmp/out"),
                credential_ref: credential.map(PathBuf::from),
            },
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_download_args_are_deterministic() {
        let a = download_args(&settings(), &request(None));
        let b = download_args(&settings(), &request(None));
        assert_eq!(a, b);
    }

    #[test]
    fn test_download_args_carry_launch_parameters() {
        let args = download_args(&settings(), &request(Some("/data/cookies.txt")));

        assert_eq!(value_after(&args, "-f"), Some("bv*[height<=720]+ba/b[height<=720]"));
        assert_eq!(value_after(&args, "-o"), Some("/tmp/out/%(title)s.%(ext)s"));
        assert_eq!(value_after(&args, "--cookies"), Some("/data/cookies.txt"));
        assert_eq!(value_after(&args, "--progress-template"), Some(PROGRESS_TEMPLATE));
        assert_eq!(value_after(&args, "--retries"), Some("10"));
        assert_eq!(value_after(&args, "--socket-timeout"), Some("30"));
        assert!(value_after(&args, "--user-agent").unwrap().starts_with("Mozilla/5.0"));
    }

    #[test]
    fn test_url_follows_end_of_options_marker() {
        let args = download_args(&settings(), &request(None));
        let n = args.len();
        assert_eq!(args[n - 2], "--");
        assert_eq!(args[n - 1], "https://www.youtube.com/watch?v=abc");
        assert!(!args.contains(&"--cookies".to_string()));
    }

    #[test]
    fn test_metadata_args_use_flat_listing() {
        let args = metadata_args(&settings(), "https://youtube.com/playlist?list=PL1", None);
        assert!(args.contains(&"--flat-playlist".to_string()));
        assert!(args.contains(&"--dump-json".to_string()));
        assert!(!args.contains(&"--progress-template".to_string()));
        assert_eq!(args.last().unwrap(), "https://youtube.com/playlist?list=PL1");
    }

    #[test]
    fn test_format_for_height() {
        assert_eq!(format_for_height(None), "bv*+ba/b");
        assert_eq!(format_for_height(Some(1080)), "bv*[height<=1080]+ba/b[height<=1080]");
    }
}
