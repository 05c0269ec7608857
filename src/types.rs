//! Core types for media-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Unique identifier for a job
///
/// Assigned in enqueue order starting at 1 and never reused while the registry lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    /// Create a new JobId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<JobId> for u64 {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Job status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Enqueued, possibly claimed and waiting for a worker slot
    Pending,
    /// An engine process is running for this job
    Active,
    /// Stopped with its launch parameters retained
    Paused,
    /// Stopped by the user, parameters discarded
    Cancelled,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
}

impl Status {
    /// Whether the job has reached an end state (only retry leaves it)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Cancelled | Status::Completed | Status::Failed)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Status::Pending => "pending",
            Status::Active => "active",
            Status::Paused => "paused",
            Status::Cancelled => "cancelled",
            Status::Completed => "completed",
            Status::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Something to download: one concrete media item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDescriptor {
    /// URL handed to the engine
    pub source_url: String,
    /// Display title
    pub title: String,
    /// Thumbnail URL, if the resolver found one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    /// Identifier on the remote platform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

impl ItemDescriptor {
    /// Descriptor with only a URL and title
    pub fn new(source_url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            title: title.into(),
            thumbnail: None,
            external_id: None,
        }
    }
}

/// Parameters captured when a job is first started and reused by resume and retry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchParams {
    /// Engine format selector (see [`crate::engine::args::format_for_height`])
    pub format_spec: String,
    /// Directory the engine writes into
    pub output_dir: PathBuf,
    /// Cookie jar passed to the engine, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_ref: Option<PathBuf>,
}

/// What the engine is currently doing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    /// Transferring media data
    Downloading,
    /// Merging or post-processing after the transfer
    Processing,
}

/// Progress snapshot parsed from engine output
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Percentage (0.0 to 100.0)
    pub percent: f32,
    /// Human-readable transfer speed as reported by the engine
    pub speed: Option<String>,
    /// Human-readable remaining time as reported by the engine
    pub eta: Option<String>,
    /// Current stage
    pub stage: ProgressStage,
}

impl Progress {
    /// Synthetic progress reported while the engine post-processes
    pub fn processing() -> Self {
        Self {
            percent: 100.0,
            speed: None,
            eta: None,
            stage: ProgressStage::Processing,
        }
    }
}

/// Read-only snapshot of a job
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobInfo {
    /// Job ID
    pub id: JobId,
    /// What is being downloaded
    pub item: ItemDescriptor,
    /// Current status
    pub status: Status,
    /// Claimed but still waiting for a worker slot (only while `Pending`)
    pub waiting_for_slot: bool,
    /// Last reported progress
    pub progress: Option<Progress>,
    /// Last failure message
    pub error: Option<String>,
    /// Final output file reported by the engine
    pub output_path: Option<PathBuf>,
    /// The last failure matched the blocked-access signature
    pub blocked_access: bool,
    /// Number of launches so far
    pub attempt: u32,
    /// Launch parameters, once captured
    pub params: Option<LaunchParams>,
    /// When the job was enqueued
    pub created_at: DateTime<Utc>,
    /// When the latest run acquired a slot
    pub started_at: Option<DateTime<Utc>>,
    /// When the job last reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,
}

/// Queue statistics
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Total jobs in the registry
    pub total: usize,
    /// Jobs in `Pending`
    pub pending: usize,
    /// Pending jobs that are claimed and waiting for a slot
    pub waiting_for_slot: usize,
    /// Jobs in `Active`
    pub active: usize,
    /// Jobs in `Paused`
    pub paused: usize,
    /// Jobs in `Cancelled`
    pub cancelled: usize,
    /// Jobs in `Completed`
    pub completed: usize,
    /// Jobs in `Failed`
    pub failed: usize,
    /// Worker pool capacity
    pub capacity: usize,
}

/// Event emitted during the job lifecycle and by the engine updater
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job added to the registry
    Queued {
        /// Job ID
        id: JobId,
        /// Item title
        title: String,
    },

    /// Job acquired a slot and its engine process was spawned
    Started {
        /// Job ID
        id: JobId,
        /// Item title
        title: String,
    },

    /// Progress update from the engine
    Progress {
        /// Job ID
        id: JobId,
        /// Progress percentage (0.0 to 100.0)
        percent: f32,
        /// Transfer speed as reported by the engine
        #[serde(skip_serializing_if = "Option::is_none")]
        speed: Option<String>,
        /// Remaining time as reported by the engine
        #[serde(skip_serializing_if = "Option::is_none")]
        eta: Option<String>,
        /// Current stage
        stage: ProgressStage,
    },

    /// Job finished successfully
    Completed {
        /// Job ID
        id: JobId,
        /// Output file, when the engine reported one
        #[serde(skip_serializing_if = "Option::is_none")]
        output_path: Option<PathBuf>,
    },

    /// Job failed
    Failed {
        /// Job ID
        id: JobId,
        /// Failure message
        error: String,
        /// The failure matched the blocked-access signature
        blocked_access: bool,
    },

    /// Job paused by the user
    Paused {
        /// Job ID
        id: JobId,
    },

    /// Job stopped because another job hit blocked access or the downloader shut down
    Interrupted {
        /// Job ID
        id: JobId,
    },

    /// Job cancelled by the user
    Cancelled {
        /// Job ID
        id: JobId,
    },

    /// Job removed from the registry
    Removed {
        /// Job ID
        id: JobId,
    },

    /// Access is being blocked; updating the engine is likely to help
    EngineUpdateSuggested {
        /// Job whose failure triggered the suggestion
        id: JobId,
        /// Message for the user
        message: String,
    },

    /// A newer engine release exists
    UpdateAvailable {
        /// Installed version, if any
        current: Option<String>,
        /// Latest published version
        latest: String,
    },

    /// Engine update started
    UpdateStarted {
        /// Version being installed
        version: String,
    },

    /// Engine update installed
    UpdateApplied {
        /// Version before the update, if any
        previous: Option<String>,
        /// Installed version
        version: String,
    },

    /// Engine update failed; the previous binary is still in place
    UpdateFailed {
        /// Failure message
        error: String,
    },

    /// Downloader is shutting down
    Shutdown,
}

impl Event {
    /// Job the event refers to, if any
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            Event::Queued { id, .. }
            | Event::Started { id, .. }
            | Event::Progress { id, .. }
            | Event::Completed { id, .. }
            | Event::Failed { id, .. }
            | Event::Paused { id }
            | Event::Interrupted { id }
            | Event::Cancelled { id }
            | Event::Removed { id }
            | Event::EngineUpdateSuggested { id, .. } => Some(*id),
            Event::UpdateAvailable { .. }
            | Event::UpdateStarted { .. }
            | Event::UpdateApplied { .. }
            | Event::UpdateFailed { .. }
            | Event::Shutdown => None,
        }
    }

    /// Name used as the SSE event type
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Queued { .. } => "queued",
            Event::Started { .. } => "started",
            Event::Progress { .. } => "progress",
            Event::Completed { .. } => "completed",
            Event::Failed { .. } => "failed",
            Event::Paused { .. } => "paused",
            Event::Interrupted { .. } => "interrupted",
            Event::Cancelled { .. } => "cancelled",
            Event::Removed { .. } => "removed",
            Event::EngineUpdateSuggested { .. } => "engine_update_suggested",
            Event::UpdateAvailable { .. } => "update_available",
            Event::UpdateStarted { .. } => "update_started",
            Event::UpdateApplied { .. } => "update_applied",
            Event::UpdateFailed { .. } => "update_failed",
            Event::Shutdown => "shutdown",
        }
    }
}
