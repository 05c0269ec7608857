//! Engine update checks and installation.

use crate::error::{Error, Result, UpdateError};
use crate::types::Event;
use crate::updater::{UpdateCheck, UpdateOutcome};

use super::MediaDownloader;
use super::coordinator::Command;

impl MediaDownloader {
    /// Compare the installed engine with the latest release
    ///
    /// Emits [`Event::UpdateAvailable`] when a newer release exists.
    pub async fn check_update(&self) -> Result<UpdateCheck> {
        let check = self.binaries.check_update().await?;
        if check.available
            && let Some(latest) = &check.latest
        {
            tracing::info!(current = ?check.current, latest = %latest, "engine update available");
            self.emit_event(Event::UpdateAvailable {
                current: check.current.clone(),
                latest: latest.clone(),
            });
        }
        Ok(check)
    }

    /// Install the latest engine release if it is newer than the installed one
    ///
    /// Running jobs keep the binary they were started with; the next spawn uses the new
    /// one. A successful update re-arms blocked-access notifications.
    pub async fn apply_update(&self) -> Result<UpdateOutcome> {
        if self.binaries.is_updating() {
            return Err(UpdateError::InProgress.into());
        }

        let result = self
            .binaries
            .update_with(|version| {
                self.emit_event(Event::UpdateStarted {
                    version: version.to_string(),
                });
            })
            .await;

        match result {
            Ok(UpdateOutcome::Updated { previous, version }) => {
                self.notify(Command::RearmBreaker);
                self.emit_event(Event::UpdateApplied {
                    previous: previous.clone(),
                    version: version.clone(),
                });
                Ok(UpdateOutcome::Updated { previous, version })
            }
            Ok(outcome) => Ok(outcome),
            Err(e @ Error::Update(UpdateError::InProgress)) => Err(e),
            Err(e) => {
                self.emit_event(Event::UpdateFailed {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Install the engine when no binary can be found; returns whether it installed one
    pub async fn ensure_engine(&self) -> Result<bool> {
        if self.engine.is_available() {
            return Ok(false);
        }
        tracing::info!(path = %self.engine.update_target().display(), "engine missing, installing latest release");
        self.apply_update().await?;
        Ok(true)
    }

    /// Version of the installed engine, if it can be run
    pub async fn engine_version(&self) -> Option<String> {
        self.binaries.installed_version().await
    }
}
