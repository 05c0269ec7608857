use super::test_helpers::*;
use super::*;
use crate::error::{DownloadError, Error};
use crate::types::{ItemDescriptor, JobId, ProgressStage, Status};
use std::time::Duration;
