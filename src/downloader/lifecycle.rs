//! Shutdown coordination.

use crate::error::Result;
use crate::types::Event;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::MediaDownloader;
use super::coordinator::Command;

/// How long shutdown waits for engine processes to exit after being killed
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl MediaDownloader {
    /// Gracefully shut down the downloader
    ///
    /// This method performs a shutdown sequence:
    /// 1. Stops accepting new jobs and launches
    /// 2. Interrupts every live run (active jobs become `Paused` with their parameters
    ///    kept, slot-waiting jobs return to `Pending`)
    /// 3. Waits for the engine processes to exit, with a timeout
    /// 4. Emits [`Event::Shutdown`]
    ///
    /// Queries keep working afterwards; the coordinator stops once every handle is dropped.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        // 1. Stop accepting new work
        self.accepting_new.store(false, Ordering::SeqCst);

        // 2. Interrupt live runs
        if let Err(e) = self.request(|reply| Command::Shutdown { reply }).await {
            tracing::warn!(error = %e, "coordinator unavailable during shutdown");
        }

        // 3. Wait for processes to release their slots
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_active_downloads()).await {
            Ok(()) => tracing::info!("All engine processes exited"),
            Err(_) => tracing::warn!(
                "Timeout waiting for engine processes to exit, proceeding with shutdown"
            ),
        }

        // 4. Emit shutdown event
        self.emit_event(Event::Shutdown);
        tracing::info!("Shutdown complete");
        Ok(())
    }

    /// Wait until every slot is free
    async fn wait_for_active_downloads(&self) {
        let capacity = u32::try_from(self.config.download.max_concurrent_downloads).unwrap_or(u32::MAX);
        match self.slots.acquire_many(capacity).await {
            Ok(permits) => drop(permits),
            Err(e) => tracing::debug!(error = %e, "slot semaphore closed"),
        }
    }
}
