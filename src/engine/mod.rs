//! External fetch engine (yt-dlp)
//!
//! The engine does all protocol work; this module only decides which binary to run,
//! how to invoke it, and how to read what it prints.

use crate::config::{Config, EngineConfig, UpdateConfig};
use std::path::{Path, PathBuf};

pub mod args;
pub mod classify;
pub mod progress;
pub mod resolver;
pub mod runner;

pub use args::{ArgSettings, DownloadRequest};
pub use classify::{classify_error, is_blocked_access};
pub use progress::{ParsedLine, parse_line};
pub use resolver::Resolver;
pub use runner::{ProcessHandle, ProcessRunner, RunOutcome, RunnerEvent, RunningProcess};

const ENGINE_NAME: &str = "yt-dlp";

/// Engine binary location plus invocation settings
///
/// The binary path is resolved again on every [`Engine::binary`] call so that a binary
/// swapped in by the updater is picked up by the next spawn.
#[derive(Clone, Debug)]
pub struct Engine {
    explicit: Option<PathBuf>,
    managed: PathBuf,
    search_path: bool,
    settings: ArgSettings,
    config: EngineConfig,
}

impl Engine {
    /// Build from the full configuration
    pub fn new(config: &Config) -> Self {
        Self {
            explicit: config.engine.binary_path.clone(),
            managed: config.update.managed_binary(),
            search_path: config.engine.search_path,
            settings: ArgSettings::new(&config.engine, &config.download),
            config: config.engine.clone(),
        }
    }

    /// Binary to spawn right now
    pub fn binary(&self) -> PathBuf {
        locate(
            self.explicit.as_deref(),
            &self.managed,
            self.search_path,
        )
    }

    /// Canonical location of the binary the updater manages
    pub fn managed_binary(&self) -> &Path {
        &self.managed
    }

    /// File the updater replaces: the configured binary, or the managed install
    ///
    /// A binary found on `PATH` is never overwritten; once the managed install exists
    /// it takes precedence over `PATH`, so both halves of an update see the same file.
    pub fn update_target(&self) -> &Path {
        self.explicit.as_deref().unwrap_or(&self.managed)
    }

    /// Whether the binary that would be spawned exists
    pub fn is_available(&self) -> bool {
        self.binary().is_file()
    }

    /// Invocation settings
    pub fn settings(&self) -> &ArgSettings {
        &self.settings
    }

    /// Engine configuration (timeouts, diagnostics limits)
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Locate the engine binary: explicit path, then the managed install, then PATH
///
/// Falls back to the managed path (which may not exist yet) so the caller can still
/// report a meaningful location or install there.
pub fn locate(explicit: Option<&Path>, managed: &Path, search_path: bool) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if managed.is_file() {
        return managed.to_path_buf();
    }
    if search_path && let Ok(found) = which::which(ENGINE_NAME) {
        return found;
    }
    managed.to_path_buf()
}

/// Locate using config sections directly
pub fn locate_from(engine: &EngineConfig, update: &UpdateConfig) -> PathBuf {
    locate(
        engine.binary_path.as_deref(),
        &update.managed_binary(),
        engine.search_path,
    )
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_explicit_path_takes_precedence() {
        let dir = tempdir().unwrap();
        let managed = dir.path().join("yt-dlp");
        std::fs::write(&managed, b"managed").unwrap();

        let explicit = PathBuf::from("/opt/custom/yt-dlp");
        assert_eq!(locate(Some(&explicit), &managed, true), explicit);
    }

    #[test]
    fn test_managed_binary_used_when_present() {
        let dir = tempdir().unwrap();
        let managed = dir.path().join("yt-dlp");
        std::fs::write(&managed, b"managed").unwrap();

        assert_eq!(locate(None, &managed, true), managed);
    }

    #[test]
    fn test_falls_back_to_managed_path_when_nothing_found() {
        let dir = tempdir().unwrap();
        let managed = dir.path().join("yt-dlp");

        assert_eq!(locate(None, &managed, false), managed);
    }

    #[test]
    fn test_update_target_follows_explicit_path() {
        let mut config = Config::default();
        assert_eq!(
            Engine::new(&config).update_target(),
            config.update.managed_binary()
        );

        config.engine.binary_path = Some(PathBuf::from("/opt/custom/yt-dlp"));
        let engine = Engine::new(&config);
        assert_eq!(engine.update_target(), Path::new("/opt/custom/yt-dlp"));
        assert_eq!(engine.binary(), engine.update_target());
    }

    #[test]
    fn test_binary_is_resolved_per_call() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.update.install_dir = dir.path().to_path_buf();
        config.engine.search_path = false;
        let engine = Engine::new(&config);

        assert!(!engine.is_available());
        std::fs::write(engine.managed_binary(), b"new").unwrap();
        assert!(engine.is_available());
        assert_eq!(engine.binary(), config.update.managed_binary());
        assert_eq!(locate_from(&config.engine, &config.update), engine.binary());
    }
}
