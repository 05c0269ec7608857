//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`jobs`] - Job registry and job control
//! - [`engine`] - Engine version checks and updates
//! - [`system`] - Health and the event stream

use serde::{Deserialize, Serialize};

mod engine;
mod jobs;
mod system;

pub use engine::*;
pub use jobs::*;
pub use system::*;

/// Body of POST /jobs
#[derive(Debug, Deserialize, Serialize)]
pub struct AddJobsRequest {
    /// Video or playlist URL
    pub url: String,
    /// Start the new jobs right away with default parameters
    #[serde(default)]
    pub start: bool,
}

/// Optional body of POST /jobs/start
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct StartJobsRequest {
    /// Explicit engine format selector; wins over `max_height`
    #[serde(default)]
    pub format: Option<String>,
    /// Cap the video height (e.g. 1080)
    #[serde(default)]
    pub max_height: Option<u32>,
}

/// Response listing job ids
#[derive(Debug, Deserialize, Serialize)]
pub struct JobIdsResponse {
    /// Affected jobs, in id order
    pub ids: Vec<crate::types::JobId>,
}
