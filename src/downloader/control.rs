//! Job control operations (pause, resume, cancel, retry).

use crate::error::Result;
use crate::types::JobId;

use super::MediaDownloader;
use super::coordinator::Command;

impl MediaDownloader {
    /// Pause an active job
    ///
    /// Terminates the engine process and keeps the launch parameters so the job can be
    /// resumed. Pausing a paused job is a no-op.
    ///
    /// # Errors
    ///
    /// [`DownloadError::NotFound`](crate::error::DownloadError::NotFound) for unknown ids,
    /// [`DownloadError::InvalidState`](crate::error::DownloadError::InvalidState) unless the
    /// job is `Active` or `Paused`.
    pub async fn pause(&self, id: JobId) -> Result<()> {
        self.request(|reply| Command::Pause { id, reply }).await?
    }

    /// Relaunch a paused job with its captured parameters
    ///
    /// The job waits for a slot again before its process is spawned. Resuming a
    /// `Pending` or `Active` job is a no-op; terminal jobs are rejected.
    pub async fn resume(&self, id: JobId) -> Result<()> {
        self.request(|reply| Command::Resume { id, reply }).await?
    }

    /// Cancel a pending, active or paused job
    ///
    /// Any live process or slot wait is stopped and the launch parameters are discarded,
    /// so a cancelled job can no longer be retried.
    pub async fn cancel(&self, id: JobId) -> Result<()> {
        self.request(|reply| Command::Cancel { id, reply }).await?
    }

    /// Relaunch a failed or cancelled job
    ///
    /// Fails with [`DownloadError::ParametersUnavailable`](crate::error::DownloadError::ParametersUnavailable)
    /// when the job no longer has launch parameters.
    pub async fn retry(&self, id: JobId) -> Result<()> {
        self.request(|reply| Command::Retry { id, reply }).await?
    }
}
