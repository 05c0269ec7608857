//! Per-run worker: waits for a slot, runs the engine, reports back

use crate::engine::{DownloadRequest, ProcessRunner, RunOutcome, RunnerEvent};
use crate::types::JobId;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::coordinator::WorkerMessage;

pub(crate) struct WorkerContext {
    pub(crate) id: JobId,
    pub(crate) attempt: u32,
    pub(crate) request: DownloadRequest,
    pub(crate) token: CancellationToken,
    pub(crate) slots: Arc<Semaphore>,
    pub(crate) runner: ProcessRunner,
    pub(crate) messages: mpsc::UnboundedSender<WorkerMessage>,
}

/// Drive one run to its end
///
/// The slot permit is released only after the coordinator has been told the outcome, so
/// a job never looks finished while it still occupies a slot.
pub(crate) async fn run(ctx: WorkerContext) {
    let WorkerContext {
        id,
        attempt,
        request,
        token,
        slots,
        runner,
        messages,
    } = ctx;

    let permit = tokio::select! {
        biased;
        _ = token.cancelled() => {
            tracing::debug!(job_id = %id, attempt, "run cancelled before a slot freed up");
            return;
        }
        permit = slots.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return,
        },
    };

    let (confirm_tx, confirm_rx) = oneshot::channel();
    if messages
        .send(WorkerMessage::SlotAcquired {
            id,
            attempt,
            reply: confirm_tx,
        })
        .is_err()
    {
        return;
    }
    if !matches!(confirm_rx.await, Ok(true)) || token.is_cancelled() {
        return;
    }

    let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
    let process = match runner.start(&request, token.clone(), sink_tx) {
        Ok(process) => process,
        Err(e) => {
            tracing::error!(job_id = %id, error = %e, "failed to spawn engine");
            messages
                .send(WorkerMessage::Finished {
                    id,
                    attempt,
                    outcome: RunOutcome::Failed {
                        message: e.to_string(),
                        blocked_access: false,
                    },
                })
                .ok();
            drop(permit);
            return;
        }
    };
    tracing::debug!(job_id = %id, pid = ?process.pid(), "engine spawned");

    // The sink closes once the supervisor has sent its last event
    while let Some(RunnerEvent::Progress(progress)) = sink_rx.recv().await {
        messages
            .send(WorkerMessage::Progress {
                id,
                attempt,
                progress,
            })
            .ok();
    }

    let outcome = process.wait().await;
    messages
        .send(WorkerMessage::Finished {
            id,
            attempt,
            outcome,
        })
        .ok();
    drop(permit);
}
