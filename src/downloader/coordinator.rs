//! Single-writer coordinator owning the job table
//!
//! Public methods send [`Command`]s; per-job workers send [`WorkerMessage`]s. Every state
//! transition happens here, in one task, so no two contexts ever race on a job.

use crate::engine::{DownloadRequest, ProcessRunner, RunOutcome};
use crate::error::{DownloadError, Error, Result};
use crate::types::{
    Event, ItemDescriptor, JobId, JobInfo, LaunchParams, Progress, QueueStats, Status,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Semaphore, broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::breaker::BlockedAccessBreaker;
use super::worker::{self, WorkerContext};

const BLOCKED_ACCESS_MESSAGE: &str = "Access is being blocked (HTTP 403). The download engine is \
     probably outdated; update it before retrying.";

/// Requests from [`super::MediaDownloader`]
pub(crate) enum Command {
    Enqueue {
        items: Vec<ItemDescriptor>,
        reply: oneshot::Sender<Result<Vec<JobId>>>,
    },
    StartAll {
        params: LaunchParams,
        reply: oneshot::Sender<Result<Vec<JobId>>>,
    },
    Start {
        id: JobId,
        params: LaunchParams,
        reply: oneshot::Sender<Result<()>>,
    },
    Pause {
        id: JobId,
        reply: oneshot::Sender<Result<()>>,
    },
    Resume {
        id: JobId,
        reply: oneshot::Sender<Result<()>>,
    },
    Cancel {
        id: JobId,
        reply: oneshot::Sender<Result<()>>,
    },
    Retry {
        id: JobId,
        reply: oneshot::Sender<Result<()>>,
    },
    ClearFinished {
        reply: oneshot::Sender<Vec<JobId>>,
    },
    Get {
        id: JobId,
        reply: oneshot::Sender<Option<JobInfo>>,
    },
    List {
        reply: oneshot::Sender<Vec<JobInfo>>,
    },
    Stats {
        reply: oneshot::Sender<QueueStats>,
    },
    RearmBreaker,
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Reports from per-job workers, tagged with the run they belong to
pub(crate) enum WorkerMessage {
    /// The worker holds a slot; the reply says whether it may spawn
    SlotAcquired {
        id: JobId,
        attempt: u32,
        reply: oneshot::Sender<bool>,
    },
    Progress {
        id: JobId,
        attempt: u32,
        progress: Progress,
    },
    Finished {
        id: JobId,
        attempt: u32,
        outcome: RunOutcome,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunPhase {
    /// Claimed, waiting for a slot
    Waiting,
    /// Holding a slot, process spawned or spawning
    Running,
}

struct LiveRun {
    attempt: u32,
    token: CancellationToken,
    phase: RunPhase,
}

struct JobEntry {
    id: JobId,
    item: ItemDescriptor,
    status: Status,
    params: Option<LaunchParams>,
    run: Option<LiveRun>,
    attempt: u32,
    progress: Option<Progress>,
    error: Option<String>,
    output_path: Option<PathBuf>,
    blocked_access: bool,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl JobEntry {
    fn new(id: JobId, item: ItemDescriptor) -> Self {
        Self {
            id,
            item,
            status: Status::Pending,
            params: None,
            run: None,
            attempt: 0,
            progress: None,
            error: None,
            output_path: None,
            blocked_access: false,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    fn waiting_for_slot(&self) -> bool {
        matches!(&self.run, Some(run) if run.phase == RunPhase::Waiting)
    }

    /// The live run, if `attempt` is the current one
    fn current_run(&self, attempt: u32) -> Option<&LiveRun> {
        self.run.as_ref().filter(|run| run.attempt == attempt)
    }

    /// Stop the live run, if any
    fn stop_run(&mut self) -> Option<RunPhase> {
        self.run.take().map(|run| {
            run.token.cancel();
            run.phase
        })
    }

    fn invalid(&self, operation: &str) -> Error {
        Error::Download(DownloadError::InvalidState {
            id: self.id.get(),
            operation: operation.to_string(),
            current_state: format!("{:?}", self.status),
        })
    }

    fn info(&self) -> JobInfo {
        JobInfo {
            id: self.id,
            item: self.item.clone(),
            status: self.status,
            waiting_for_slot: self.waiting_for_slot(),
            progress: self.progress.clone(),
            error: self.error.clone(),
            output_path: self.output_path.clone(),
            blocked_access: self.blocked_access,
            attempt: self.attempt,
            params: self.params.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// Channels and collaborators handed to the coordinator task
pub(crate) struct CoordinatorParts {
    pub(crate) commands: mpsc::UnboundedReceiver<Command>,
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) slots: Arc<Semaphore>,
    pub(crate) capacity: usize,
    pub(crate) runner: ProcessRunner,
    pub(crate) breaker: BlockedAccessBreaker,
}

pub(crate) struct Coordinator {
    jobs: HashMap<JobId, JobEntry>,
    next_id: u64,
    commands: mpsc::UnboundedReceiver<Command>,
    worker_tx: mpsc::UnboundedSender<WorkerMessage>,
    worker_rx: mpsc::UnboundedReceiver<WorkerMessage>,
    event_tx: broadcast::Sender<Event>,
    slots: Arc<Semaphore>,
    capacity: usize,
    runner: ProcessRunner,
    breaker: BlockedAccessBreaker,
    shutting_down: bool,
}

impl Coordinator {
    pub(crate) fn new(parts: CoordinatorParts) -> Self {
        let (worker_tx, worker_rx) = mpsc::unbounded_channel();
        Self {
            jobs: HashMap::new(),
            next_id: 1,
            commands: parts.commands,
            worker_tx,
            worker_rx,
            event_tx: parts.event_tx,
            slots: parts.slots,
            capacity: parts.capacity,
            runner: parts.runner,
            breaker: parts.breaker,
            shutting_down: false,
        }
    }

    /// Run until every downloader handle has been dropped
    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(message) = self.worker_rx.recv() => self.handle_worker(message),
            }
        }

        for entry in self.jobs.values_mut() {
            entry.stop_run();
        }
        tracing::debug!("coordinator stopped");
    }

    fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Enqueue { items, reply } => {
                reply.send(self.enqueue(items)).ok();
            }
            Command::StartAll { params, reply } => {
                reply.send(self.start_all(params)).ok();
            }
            Command::Start { id, params, reply } => {
                reply.send(self.start(id, params)).ok();
            }
            Command::Pause { id, reply } => {
                reply.send(self.pause(id)).ok();
            }
            Command::Resume { id, reply } => {
                reply.send(self.resume(id)).ok();
            }
            Command::Cancel { id, reply } => {
                reply.send(self.cancel(id)).ok();
            }
            Command::Retry { id, reply } => {
                reply.send(self.retry(id)).ok();
            }
            Command::ClearFinished { reply } => {
                reply.send(self.clear_finished()).ok();
            }
            Command::Get { id, reply } => {
                reply.send(self.jobs.get(&id).map(JobEntry::info)).ok();
            }
            Command::List { reply } => {
                reply.send(self.list()).ok();
            }
            Command::Stats { reply } => {
                reply.send(self.stats()).ok();
            }
            Command::RearmBreaker => {
                self.breaker.rearm();
                tracing::debug!("blocked-access notifications re-armed");
            }
            Command::Shutdown { reply } => {
                self.shutdown();
                reply.send(()).ok();
            }
        }
    }

    fn entry_mut(&mut self, id: JobId) -> Result<&mut JobEntry> {
        self.jobs
            .get_mut(&id)
            .ok_or(Error::Download(DownloadError::NotFound { id: id.get() }))
    }

    fn enqueue(&mut self, items: Vec<ItemDescriptor>) -> Result<Vec<JobId>> {
        if self.shutting_down {
            return Err(Error::ShuttingDown);
        }

        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            let id = JobId(self.next_id);
            self.next_id += 1;
            tracing::debug!(job_id = %id, title = %item.title, "job queued");
            self.emit(Event::Queued {
                id,
                title: item.title.clone(),
            });
            self.jobs.insert(id, JobEntry::new(id, item));
            ids.push(id);
        }
        Ok(ids)
    }

    fn start_all(&mut self, params: LaunchParams) -> Result<Vec<JobId>> {
        if self.shutting_down {
            return Err(Error::ShuttingDown);
        }

        let mut claimable: Vec<JobId> = self
            .jobs
            .values()
            .filter(|e| e.status == Status::Pending && e.run.is_none())
            .map(|e| e.id)
            .collect();
        claimable.sort();

        for id in &claimable {
            if let Some(entry) = self.jobs.get_mut(id) {
                entry.params.get_or_insert_with(|| params.clone());
            }
            self.launch(*id);
        }

        tracing::info!(claimed = claimable.len(), "started pending jobs");
        Ok(claimable)
    }

    fn start(&mut self, id: JobId, params: LaunchParams) -> Result<()> {
        if self.shutting_down {
            return Err(Error::ShuttingDown);
        }

        let entry = self.entry_mut(id)?;
        match entry.status {
            Status::Pending if entry.run.is_some() => Ok(()),
            Status::Pending => {
                entry.params.get_or_insert(params);
                self.launch(id);
                Ok(())
            }
            _ => Err(entry.invalid("start")),
        }
    }

    fn pause(&mut self, id: JobId) -> Result<()> {
        let entry = self.entry_mut(id)?;
        match entry.status {
            Status::Paused => Ok(()),
            Status::Active => {
                entry.stop_run();
                entry.status = Status::Paused;
                tracing::info!(job_id = %id, "job paused");
                self.emit(Event::Paused { id });
                Ok(())
            }
            _ => Err(entry.invalid("pause")),
        }
    }

    fn resume(&mut self, id: JobId) -> Result<()> {
        if self.shutting_down {
            return Err(Error::ShuttingDown);
        }

        let entry = self.entry_mut(id)?;
        match entry.status {
            Status::Pending | Status::Active => Ok(()),
            Status::Paused => {
                if entry.params.is_none() {
                    return Err(Error::Download(DownloadError::ParametersUnavailable {
                        id: id.get(),
                    }));
                }
                tracing::info!(job_id = %id, "resuming job");
                self.launch(id);
                Ok(())
            }
            Status::Cancelled | Status::Completed | Status::Failed => Err(entry.invalid("resume")),
        }
    }

    fn cancel(&mut self, id: JobId) -> Result<()> {
        let entry = self.entry_mut(id)?;
        match entry.status {
            Status::Cancelled => Ok(()),
            Status::Completed | Status::Failed => Err(entry.invalid("cancel")),
            Status::Pending | Status::Active | Status::Paused => {
                entry.stop_run();
                entry.params = None;
                entry.status = Status::Cancelled;
                entry.finished_at = Some(Utc::now());
                tracing::info!(job_id = %id, "job cancelled");
                self.emit(Event::Cancelled { id });
                Ok(())
            }
        }
    }

    fn retry(&mut self, id: JobId) -> Result<()> {
        if self.shutting_down {
            return Err(Error::ShuttingDown);
        }

        let entry = self.entry_mut(id)?;
        match entry.status {
            Status::Failed | Status::Cancelled => {
                if entry.params.is_none() {
                    return Err(Error::Download(DownloadError::ParametersUnavailable {
                        id: id.get(),
                    }));
                }
                entry.error = None;
                entry.blocked_access = false;
                entry.progress = None;
                entry.output_path = None;
                entry.finished_at = None;
                tracing::info!(job_id = %id, "retrying job");
                self.launch(id);
                Ok(())
            }
            _ => Err(entry.invalid("retry")),
        }
    }

    fn clear_finished(&mut self) -> Vec<JobId> {
        let mut removed: Vec<JobId> = self
            .jobs
            .values()
            .filter(|e| e.status.is_terminal())
            .map(|e| e.id)
            .collect();
        removed.sort();

        for id in &removed {
            self.jobs.remove(id);
            self.emit(Event::Removed { id: *id });
        }
        removed
    }

    fn list(&self) -> Vec<JobInfo> {
        let mut jobs: Vec<JobInfo> = self.jobs.values().map(JobEntry::info).collect();
        jobs.sort_by_key(|j| j.id);
        jobs
    }

    fn stats(&self) -> QueueStats {
        let mut stats = QueueStats {
            total: self.jobs.len(),
            capacity: self.capacity,
            ..QueueStats::default()
        };
        for entry in self.jobs.values() {
            match entry.status {
                Status::Pending => stats.pending += 1,
                Status::Active => stats.active += 1,
                Status::Paused => stats.paused += 1,
                Status::Cancelled => stats.cancelled += 1,
                Status::Completed => stats.completed += 1,
                Status::Failed => stats.failed += 1,
            }
            if entry.waiting_for_slot() {
                stats.waiting_for_slot += 1;
            }
        }
        stats
    }

    /// Start a fresh run for a job whose parameters are captured
    fn launch(&mut self, id: JobId) {
        let Some(entry) = self.jobs.get_mut(&id) else {
            return;
        };
        let Some(params) = entry.params.clone() else {
            return;
        };

        entry.stop_run();
        entry.attempt += 1;
        entry.status = Status::Pending;
        let token = CancellationToken::new();
        entry.run = Some(LiveRun {
            attempt: entry.attempt,
            token: token.clone(),
            phase: RunPhase::Waiting,
        });

        let ctx = WorkerContext {
            id,
            attempt: entry.attempt,
            request: DownloadRequest {
                source_url: entry.item.source_url.clone(),
                params,
            },
            token,
            slots: self.slots.clone(),
            runner: self.runner.clone(),
            messages: self.worker_tx.clone(),
        };
        tracing::debug!(job_id = %id, attempt = entry.attempt, "job waiting for a slot");
        tokio::spawn(worker::run(ctx));
    }

    fn handle_worker(&mut self, message: WorkerMessage) {
        match message {
            WorkerMessage::SlotAcquired { id, attempt, reply } => {
                let confirmed = self.activate(id, attempt);
                reply.send(confirmed).ok();
            }
            WorkerMessage::Progress {
                id,
                attempt,
                progress,
            } => {
                let Some(entry) = self.jobs.get_mut(&id) else {
                    return;
                };
                if entry.status != Status::Active || entry.current_run(attempt).is_none() {
                    return;
                }
                entry.progress = Some(progress.clone());
                self.emit(Event::Progress {
                    id,
                    percent: progress.percent,
                    speed: progress.speed,
                    eta: progress.eta,
                    stage: progress.stage,
                });
            }
            WorkerMessage::Finished {
                id,
                attempt,
                outcome,
            } => self.finish(id, attempt, outcome),
        }
    }

    fn activate(&mut self, id: JobId, attempt: u32) -> bool {
        if self.shutting_down {
            return false;
        }
        let Some(entry) = self.jobs.get_mut(&id) else {
            return false;
        };
        let Some(run) = entry.run.as_mut().filter(|run| run.attempt == attempt) else {
            tracing::debug!(job_id = %id, attempt, "slot acquired by a stale run, releasing");
            return false;
        };
        if run.token.is_cancelled() {
            return false;
        }

        run.phase = RunPhase::Running;
        entry.status = Status::Active;
        entry.started_at = Some(Utc::now());
        tracing::info!(job_id = %id, attempt, title = %entry.item.title, "job started");
        let title = entry.item.title.clone();
        self.emit(Event::Started { id, title });
        true
    }

    fn finish(&mut self, id: JobId, attempt: u32, outcome: RunOutcome) {
        let Some(entry) = self.jobs.get_mut(&id) else {
            return;
        };
        if entry.current_run(attempt).is_none() {
            tracing::debug!(job_id = %id, attempt, "ignoring outcome of a stale run");
            return;
        }
        entry.run = None;

        match outcome {
            RunOutcome::Completed { output_path } => {
                entry.status = Status::Completed;
                entry.output_path = output_path.clone();
                entry.finished_at = Some(Utc::now());
                tracing::info!(job_id = %id, output = ?output_path, "job completed");
                self.emit(Event::Completed { id, output_path });
            }
            RunOutcome::Terminated => {
                // Killed without going through pause or cancel
                entry.status = Status::Paused;
                tracing::warn!(job_id = %id, "engine process terminated unexpectedly");
                self.emit(Event::Interrupted { id });
            }
            RunOutcome::Failed {
                message,
                blocked_access: true,
            } => {
                self.trip_breaker(id, message);
            }
            RunOutcome::Failed { message, .. } => {
                entry.status = Status::Failed;
                entry.error = Some(message.clone());
                entry.blocked_access = false;
                entry.finished_at = Some(Utc::now());
                tracing::warn!(job_id = %id, error = %message, "job failed");
                self.emit(Event::Failed {
                    id,
                    error: message,
                    blocked_access: false,
                });
            }
        }
    }

    /// Fail the job, stop every other live run, and prompt for an engine update once
    fn trip_breaker(&mut self, id: JobId, message: String) {
        if let Some(entry) = self.jobs.get_mut(&id) {
            entry.status = Status::Failed;
            entry.error = Some(message.clone());
            entry.blocked_access = true;
            entry.finished_at = Some(Utc::now());
        }
        tracing::warn!(job_id = %id, error = %message, "blocked access detected, stopping all jobs");
        self.emit(Event::Failed {
            id,
            error: message,
            blocked_access: true,
        });

        let interrupted = self.interrupt_all();
        tracing::info!(interrupted = interrupted.len(), "jobs interrupted after blocked access");

        if self.breaker.should_notify() {
            self.emit(Event::EngineUpdateSuggested {
                id,
                message: BLOCKED_ACCESS_MESSAGE.to_string(),
            });
        } else {
            tracing::debug!(job_id = %id, "update already suggested within cooldown");
        }
    }

    /// Stop every live run: running jobs become `Paused`, waiting jobs go back to unclaimed `Pending`
    fn interrupt_all(&mut self) -> Vec<JobId> {
        let mut interrupted = Vec::new();
        let mut ids: Vec<JobId> = self
            .jobs
            .values()
            .filter(|e| e.run.is_some())
            .map(|e| e.id)
            .collect();
        ids.sort();

        for id in ids {
            let Some(entry) = self.jobs.get_mut(&id) else {
                continue;
            };
            match entry.stop_run() {
                Some(RunPhase::Running) => entry.status = Status::Paused,
                Some(RunPhase::Waiting) => entry.status = Status::Pending,
                None => continue,
            }
            interrupted.push(id);
            self.emit(Event::Interrupted { id });
        }
        interrupted
    }

    fn shutdown(&mut self) {
        self.shutting_down = true;
        let interrupted = self.interrupt_all();
        tracing::info!(interrupted = interrupted.len(), "coordinator shutting down");
    }
}
