//! Enqueueing, claiming and registry queries.

use crate::engine::resolver::Resolution;
use crate::error::{Error, Result};
use crate::types::{ItemDescriptor, JobId, JobInfo, LaunchParams, QueueStats};
use std::sync::atomic::Ordering;

use super::MediaDownloader;
use super::coordinator::Command;

impl MediaDownloader {
    /// Add one item as a `Pending` job
    ///
    /// The job does nothing until it is claimed by [`Self::start_all`] or [`Self::start`].
    pub async fn enqueue(&self, item: ItemDescriptor) -> Result<JobId> {
        let ids = self.enqueue_items(vec![item]).await?;
        ids.into_iter()
            .next()
            .ok_or_else(|| Error::Other("enqueue produced no job".to_string()))
    }

    /// Add every item of a resolution, in order
    pub async fn enqueue_resolution(&self, resolution: Resolution) -> Result<Vec<JobId>> {
        self.enqueue_items(resolution.descriptors()).await
    }

    /// Resolve `url` with the current credential and enqueue what it contains
    ///
    /// A single item yields one job; a collection of K entries yields K jobs.
    pub async fn add_url(&self, url: &str) -> Result<Vec<JobId>> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let cookies = self.credentials.read().await.cookies_path();
        let resolution = self.resolver.resolve(url, cookies.as_deref()).await?;
        let ids = self.enqueue_resolution(resolution).await?;

        tracing::info!(url, jobs = ids.len(), "URL added to queue");
        Ok(ids)
    }

    async fn enqueue_items(&self, items: Vec<ItemDescriptor>) -> Result<Vec<JobId>> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        self.request(|reply| Command::Enqueue { items, reply })
            .await?
    }

    /// Claim every unclaimed `Pending` job and launch it with `params`
    ///
    /// Jobs that already captured parameters keep them. Each launched job waits for a
    /// free slot before its process is spawned.
    pub async fn start_all(&self, params: LaunchParams) -> Result<Vec<JobId>> {
        self.request(|reply| Command::StartAll { params, reply })
            .await?
    }

    /// Claim a single `Pending` job
    pub async fn start(&self, id: JobId, params: LaunchParams) -> Result<()> {
        self.request(|reply| Command::Start { id, params, reply })
            .await?
    }

    /// Remove every cancelled, completed and failed job
    pub async fn clear_finished(&self) -> Result<Vec<JobId>> {
        self.request(|reply| Command::ClearFinished { reply }).await
    }

    /// Snapshot of one job
    pub async fn get(&self, id: JobId) -> Result<Option<JobInfo>> {
        self.request(|reply| Command::Get { id, reply }).await
    }

    /// Snapshot of every job, in id order
    pub async fn list(&self) -> Result<Vec<JobInfo>> {
        self.request(|reply| Command::List { reply }).await
    }

    /// Per-status counts
    pub async fn stats(&self) -> Result<QueueStats> {
        self.request(|reply| Command::Stats { reply }).await
    }
}
