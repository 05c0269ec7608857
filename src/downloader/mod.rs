//! Core downloader implementation split into focused submodules.
//!
//! The `MediaDownloader` struct and its methods are organized by domain:
//! - [`queue`] - Enqueueing, claiming and queries
//! - [`control`] - Job control (pause/resume/cancel/retry)
//! - [`update_ops`] - Engine update checks and installation
//! - [`account`] - Credential state and launch parameter defaults
//! - [`lifecycle`] - Shutdown coordination
//! - [`coordinator`] - Single-writer task owning the job table
//! - [`worker`] - Per-run slot acquisition and process supervision
//! - [`breaker`] - Blocked-access notification cooldown

mod account;
mod breaker;
mod control;
mod coordinator;
mod lifecycle;
mod queue;
mod update_ops;
mod worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(all(test, unix))]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(all(test, unix))]
mod tests;

use crate::auth::CredentialStore;
use crate::config::Config;
use crate::engine::{Engine, ProcessRunner, Resolver};
use crate::error::{Error, Result};
use crate::types::Event;
use crate::updater::{BinaryManager, HttpReleaseFeed, ReleaseFeed};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::sync::{RwLock, Semaphore, broadcast, mpsc, oneshot};

use breaker::BlockedAccessBreaker;
use coordinator::{Command, Coordinator, CoordinatorParts};

/// Main downloader instance (cloneable - all fields are Arc-wrapped or channels)
#[derive(Clone)]
pub struct MediaDownloader {
    /// Command channel into the coordinator task
    commands: mpsc::UnboundedSender<Command>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Engine location and invocation settings
    pub(crate) engine: Engine,
    /// Metadata lookups for `add_url`
    pub(crate) resolver: Resolver,
    /// Engine version checks and self-update
    pub(crate) binaries: Arc<BinaryManager>,
    /// Cookie jar and cached login record
    pub(crate) credentials: Arc<RwLock<CredentialStore>>,
    /// Flag to indicate whether new work is accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Concurrent download slots (respects max_concurrent_downloads config)
    pub(crate) slots: Arc<Semaphore>,
}

impl MediaDownloader {
    /// Create a new MediaDownloader instance
    ///
    /// This initializes all core components:
    /// - Validates the configuration and creates the download directory
    /// - Locates the engine binary (it may be installed later via `ensure_engine`)
    /// - Loads the credential record
    /// - Spawns the coordinator task
    pub async fn new(config: Config) -> Result<Self> {
        let feed = Arc::new(HttpReleaseFeed::new(&config.update)?);
        Self::with_release_feed(config, feed).await
    }

    /// Create a downloader that fetches engine releases from `feed`
    pub async fn with_release_feed(config: Config, feed: Arc<dyn ReleaseFeed>) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.download.download_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create download directory '{}': {}",
                        config.download.download_dir.display(),
                        e
                    ),
                ))
            })?;

        let engine = Engine::new(&config);
        if engine.is_available() {
            tracing::info!(binary = %engine.binary().display(), "engine located");
        } else {
            tracing::warn!(
                managed = %engine.managed_binary().display(),
                "engine binary not found; install it before starting downloads"
            );
        }

        let binaries = Arc::new(BinaryManager::new(&config, engine.clone(), feed));
        let credentials = Arc::new(RwLock::new(CredentialStore::open(&config.persistence)));

        let (event_tx, _rx) = broadcast::channel(config.download.event_buffer.max(1));
        let (commands, command_rx) = mpsc::unbounded_channel();
        let capacity = config.download.max_concurrent_downloads;
        let slots = Arc::new(Semaphore::new(capacity));

        let coordinator = Coordinator::new(CoordinatorParts {
            commands: command_rx,
            event_tx: event_tx.clone(),
            slots: slots.clone(),
            capacity,
            runner: ProcessRunner::new(engine.clone()),
            breaker: BlockedAccessBreaker::new(config.download.blocked_access_cooldown),
        });
        tokio::spawn(coordinator.run());

        tracing::info!(capacity, download_dir = %config.download.download_dir.display(), "downloader ready");

        Ok(Self {
            commands,
            event_tx,
            resolver: Resolver::new(engine.clone()),
            engine,
            binaries,
            credentials,
            accepting_new: Arc::new(AtomicBool::new(true)),
            slots,
            config: Arc::new(config),
        })
    }

    /// Subscribe to job and engine events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// A subscriber that falls behind by more than `download.event_buffer` events receives
    /// `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Engine used for downloads and metadata lookups
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Emit an event to all subscribers
    ///
    /// Events without subscribers are dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Send a command built around a fresh reply channel and wait for the answer
    pub(crate) async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .map_err(|_| Error::ShuttingDown)?;
        rx.await.map_err(|_| Error::ShuttingDown)
    }

    /// Send a command that expects no answer
    pub(crate) fn notify(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("coordinator already stopped");
        }
    }
}
