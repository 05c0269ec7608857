//! Runs one engine download process and reports what it prints

use crate::error::{Error, Result};
use crate::types::Progress;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::Engine;
use super::args::{DownloadRequest, download_args};
use super::classify::is_blocked_access;
use super::progress::{ParsedLine, merger_target, parse_line};

/// Streamed output of a running process, in emission order
#[derive(Clone, Debug, PartialEq)]
pub enum RunnerEvent {
    /// Parsed progress (including the synthetic 100% processing update)
    Progress(Progress),
}

/// How a run ended; exactly one per process
#[derive(Clone, Debug, PartialEq)]
pub enum RunOutcome {
    /// Exit code 0
    Completed {
        /// File the engine reported writing, if any
        output_path: Option<PathBuf>,
    },
    /// Non-zero exit or the process could not be waited on
    Failed {
        /// Diagnostic text from the tail of the output, cut to `engine.max_error_len`
        message: String,
        /// The full, untruncated diagnostic matched the blocked-access signature
        blocked_access: bool,
    },
    /// Stopped through [`ProcessHandle::terminate`]; never an error
    Terminated,
}

/// Clonable handle that can stop a run from any task
#[derive(Clone, Debug)]
pub struct ProcessHandle {
    token: CancellationToken,
}

impl ProcessHandle {
    /// Kill the process; idempotent and a no-op after exit
    pub fn terminate(&self) {
        self.token.cancel();
    }

    /// Whether terminate has been requested
    pub fn is_terminated(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// A spawned engine process
pub struct RunningProcess {
    handle: ProcessHandle,
    pid: Option<u32>,
    supervisor: JoinHandle<RunOutcome>,
}

impl RunningProcess {
    /// Handle for terminating the run
    pub fn handle(&self) -> ProcessHandle {
        self.handle.clone()
    }

    /// OS process id, while known
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Wait for the outcome; every progress event has been sent by the time this returns
    pub async fn wait(self) -> RunOutcome {
        match self.supervisor.await {
            Ok(outcome) => outcome,
            Err(e) => RunOutcome::Failed {
                message: format!("engine supervisor task failed: {}", e),
                blocked_access: false,
            },
        }
    }
}

/// Spawns engine download processes
#[derive(Clone, Debug)]
pub struct ProcessRunner {
    engine: Engine,
}

impl ProcessRunner {
    /// Create a runner for the given engine
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    /// Engine used for spawning
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Spawn the engine for one request
    ///
    /// Progress is sent to `sink` in the order the process prints it. Cancelling `token`
    /// (or calling [`ProcessHandle::terminate`]) kills the process and yields
    /// [`RunOutcome::Terminated`].
    pub fn start(
        &self,
        request: &DownloadRequest,
        token: CancellationToken,
        sink: mpsc::UnboundedSender<RunnerEvent>,
    ) -> Result<RunningProcess> {
        let binary = self.engine.binary();
        let args = download_args(self.engine.settings(), request);

        tracing::debug!(binary = %binary.display(), url = %request.source_url, "spawning engine");

        let mut child = Command::new(&binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::ExternalTool(format!("failed to start {}: {}", binary.display(), e))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::ExternalTool("engine stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::ExternalTool("engine stderr unavailable".to_string()))?;
        let pid = child.id();

        let limits = OutputLimits {
            tail_lines: self.engine.config().diagnostic_lines.max(1),
            max_error_len: self.engine.config().max_error_len.max(1),
        };
        let supervisor = tokio::spawn(supervise(
            child,
            stdout,
            stderr,
            token.clone(),
            sink,
            limits,
        ));

        Ok(RunningProcess {
            handle: ProcessHandle { token },
            pid,
            supervisor,
        })
    }
}

#[derive(Clone, Copy)]
struct OutputLimits {
    tail_lines: usize,
    max_error_len: usize,
}

struct OutputState {
    tail: VecDeque<String>,
    output_path: Option<PathBuf>,
    limits: OutputLimits,
}

impl OutputState {
    fn new(limits: OutputLimits) -> Self {
        Self {
            tail: VecDeque::with_capacity(limits.tail_lines),
            output_path: None,
            limits,
        }
    }

    fn consume(&mut self, line: &str, sink: &mpsc::UnboundedSender<RunnerEvent>) {
        match parse_line(line) {
            Some(ParsedLine::Progress(progress)) => {
                sink.send(RunnerEvent::Progress(progress)).ok();
            }
            Some(ParsedLine::Processing) => {
                if let Some(path) = merger_target(line) {
                    self.output_path = Some(path);
                }
                sink.send(RunnerEvent::Progress(Progress::processing())).ok();
            }
            Some(ParsedLine::OutputFile(path)) => {
                self.output_path = Some(path);
            }
            None => self.remember(line),
        }
    }

    /// Handle one `read_until` result; returns true once the stream is exhausted
    fn take_line(
        &mut self,
        read: std::io::Result<usize>,
        buf: &mut Vec<u8>,
        sink: &mpsc::UnboundedSender<RunnerEvent>,
        stream: &str,
    ) -> bool {
        match read {
            Ok(0) => true,
            Ok(_) => {
                let line = String::from_utf8_lossy(buf).into_owned();
                buf.clear();
                self.consume(line.trim_end_matches(['\n', '\r']), sink);
                false
            }
            Err(e) => {
                tracing::debug!(error = %e, stream, "engine output read failed");
                true
            }
        }
    }

    fn remember(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if self.tail.len() == self.limits.tail_lines {
            self.tail.pop_front();
        }
        self.tail.push_back(line.to_string());
    }

    fn failure(&self, code: Option<i32>) -> RunOutcome {
        let preferred = self
            .tail
            .iter()
            .rev()
            .find(|line| line.contains("ERROR:"))
            .or_else(|| self.tail.back());

        let message = match preferred {
            Some(line) => line.clone(),
            None => match code {
                Some(code) => format!("engine exited with status {}", code),
                None => "engine was killed by a signal".to_string(),
            },
        };
        RunOutcome::Failed {
            blocked_access: is_blocked_access(&message),
            message: truncate_chars(&message, self.limits.max_error_len),
        }
    }

    #[cfg(test)]
    fn failure_message(&self, code: Option<i32>) -> String {
        match self.failure(code) {
            RunOutcome::Failed { message, .. } => message,
            other => panic!("expected failure outcome, got {:?}", other),
        }
    }
}

async fn supervise(
    mut child: Child,
    stdout: ChildStdout,
    stderr: ChildStderr,
    token: CancellationToken,
    sink: mpsc::UnboundedSender<RunnerEvent>,
    limits: OutputLimits,
) -> RunOutcome {
    let mut out = BufReader::new(stdout);
    let mut err = BufReader::new(stderr);
    // Raw bytes: a line that is not valid UTF-8 must not stop the stream
    let mut out_buf = Vec::new();
    let mut err_buf = Vec::new();
    let mut out_done = false;
    let mut err_done = false;
    let mut state = OutputState::new(limits);
    let mut terminated = false;

    while !(out_done && err_done) {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                terminated = true;
                break;
            }
            read = out.read_until(b'\n', &mut out_buf), if !out_done => {
                out_done = state.take_line(read, &mut out_buf, &sink, "stdout");
            }
            read = err.read_until(b'\n', &mut err_buf), if !err_done => {
                err_done = state.take_line(read, &mut err_buf, &sink, "stderr");
            }
        }
    }

    if terminated {
        kill(&mut child).await;
        return RunOutcome::Terminated;
    }

    let exit = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        status = child.wait() => Some(status),
    };

    match exit {
        None => {
            kill(&mut child).await;
            RunOutcome::Terminated
        }
        Some(Ok(status)) if status.success() => RunOutcome::Completed {
            output_path: state.output_path,
        },
        Some(Ok(_)) if token.is_cancelled() => RunOutcome::Terminated,
        Some(Ok(status)) => state.failure(status.code()),
        Some(Err(e)) => RunOutcome::Failed {
            message: format!("failed to wait for engine: {}", e),
            blocked_access: false,
        },
    }
}

async fn kill(child: &mut Child) {
    if let Err(e) = child.kill().await {
        // Already exited between the cancel and the kill
        tracing::debug!(error = %e, "engine kill failed");
    }
}

fn truncate_chars(message: &str, max: usize) -> String {
    if message.chars().count() <= max {
        message.to_string()
    } else {
        let mut out: String = message.chars().take(max.saturating_sub(3)).collect();
        out.push_str("...");
        out
    }
}
