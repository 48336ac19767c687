//! Job execution: the [`JobExecutor`] seam and the real process-backed executor

use crate::error::JobError;
use crate::jobs::ConversionJob;
use crate::types::{BatchEvent, JobStatus, OutputStream};
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

/// How long output readers may keep draining after the process is gone
///
/// A grandchild that inherited the pipes can keep them open after the converter
/// itself exited or was killed.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Per-job execution parameters handed to a [`JobExecutor`]
#[derive(Clone)]
pub struct ExecutionContext {
    /// Index of the job in its batch
    pub index: usize,
    /// Batch-wide cancellation signal
    pub cancel: CancellationToken,
    /// Time a cancelled process gets before it is killed
    pub grace_period: Duration,
    /// Number of output lines to keep for the job report
    pub max_captured_lines: usize,
    events: mpsc::UnboundedSender<BatchEvent>,
}

impl ExecutionContext {
    pub(crate) fn new(
        index: usize,
        cancel: CancellationToken,
        grace_period: Duration,
        max_captured_lines: usize,
        events: mpsc::UnboundedSender<BatchEvent>,
    ) -> Self {
        Self {
            index,
            cancel,
            grace_period,
            max_captured_lines,
            events,
        }
    }

    /// Forward one line of converter output to the batch's event stream
    pub fn emit_output(&self, stream: OutputStream, line: String) {
        self.events
            .send(BatchEvent::Output {
                index: self.index,
                stream,
                line,
            })
            .ok();
    }
}

/// How a job ended
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    /// Terminal status: succeeded, failed or cancelled
    pub status: JobStatus,
    /// Exit code, when the process exited normally
    pub exit_code: Option<i32>,
    /// Summary message
    pub message: String,
    /// Tail of the output, in arrival order
    pub output: Vec<String>,
}

impl JobOutcome {
    /// Outcome for a job that completed with exit code 0
    pub fn succeeded(output: Vec<String>) -> Self {
        Self {
            status: JobStatus::Succeeded,
            exit_code: Some(0),
            message: "conversion finished".to_string(),
            output,
        }
    }

    /// Outcome for a job that failed with `error`
    pub fn failed(error: &JobError, output: Vec<String>) -> Self {
        let exit_code = match error {
            JobError::ExitCode { code, .. } => *code,
            _ => None,
        };
        Self {
            status: JobStatus::Failed,
            exit_code,
            message: error.to_string(),
            output,
        }
    }

    /// Outcome for a job stopped by cancellation
    pub fn cancelled(output: Vec<String>) -> Self {
        Self {
            status: JobStatus::Cancelled,
            exit_code: None,
            message: "cancelled".to_string(),
            output,
        }
    }
}

/// Runs a single conversion job to completion
///
/// Implementations must honor `ctx.cancel` and must not return before the job
/// has stopped.
#[async_trait::async_trait]
pub trait JobExecutor: Send + Sync {
    /// Run `job` and report how it ended
    async fn execute(&self, job: &ConversionJob, ctx: ExecutionContext) -> JobOutcome;
}

/// Executes jobs by launching the converter as a child process
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    /// Create a process executor
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl JobExecutor for ProcessExecutor {
    async fn execute(&self, job: &ConversionJob, ctx: ExecutionContext) -> JobOutcome {
        let world = job.world_name();

        if let Err(e) = tokio::fs::create_dir_all(&job.output_path).await {
            let error = JobError::OutputDirectory {
                world,
                path: job.output_path.clone(),
                reason: e.to_string(),
            };
            tracing::warn!(index = ctx.index, error = %error, "job failed");
            return JobOutcome::failed(&error, Vec::new());
        }

        let invocation = job.invocation();
        let mut command = invocation.command();
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        crate::utils::hide_console_window(&mut command);

        tracing::debug!(index = ctx.index, command = %invocation, "launching converter");

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let error = JobError::SubprocessLaunch {
                    world,
                    program: invocation.program.clone(),
                    reason: e.to_string(),
                };
                tracing::warn!(index = ctx.index, error = %error, "job failed");
                return JobOutcome::failed(&error, Vec::new());
            }
        };

        let tail = Arc::new(Mutex::new(VecDeque::with_capacity(ctx.max_captured_lines)));
        let stdout_reader = child.stdout.take().map(|stdout| {
            tokio::spawn(forward_lines(
                stdout,
                OutputStream::Stdout,
                ctx.clone(),
                Arc::clone(&tail),
            ))
        });
        let stderr_reader = child.stderr.take().map(|stderr| {
            tokio::spawn(forward_lines(
                stderr,
                OutputStream::Stderr,
                ctx.clone(),
                Arc::clone(&tail),
            ))
        });

        let finished = tokio::select! {
            status = child.wait() => Some(status),
            _ = ctx.cancel.cancelled() => {
                terminate(&mut child, ctx.grace_period).await;
                None
            }
        };

        if let Some(reader) = stdout_reader {
            drain(reader).await;
        }
        let last_stderr = match stderr_reader {
            Some(reader) => drain(reader).await,
            None => None,
        };
        let output: Vec<String> = tail.lock().await.drain(..).collect();

        match finished {
            None => {
                tracing::info!(index = ctx.index, world = %world, "job cancelled");
                JobOutcome::cancelled(output)
            }
            Some(Ok(status)) if status.success() => {
                tracing::info!(index = ctx.index, world = %world, "job succeeded");
                JobOutcome::succeeded(output)
            }
            Some(Ok(status)) => {
                let error = JobError::ExitCode {
                    world,
                    code: status.code(),
                };
                tracing::warn!(index = ctx.index, error = %error, "job failed");
                let mut outcome = JobOutcome::failed(&error, output);
                if let Some(line) = last_stderr {
                    outcome.message = format!("{}: {}", outcome.message, line);
                }
                outcome
            }
            Some(Err(e)) => {
                let error = JobError::SubprocessLaunch {
                    world,
                    program: invocation.program.clone(),
                    reason: format!("failed to wait for process: {}", e),
                };
                tracing::warn!(index = ctx.index, error = %error, "job failed");
                JobOutcome::failed(&error, output)
            }
        }
    }
}

/// Read lines until EOF, forwarding each and keeping a bounded tail
///
/// Returns the last non-empty line seen. Invalid UTF-8 is replaced rather than
/// ending the stream.
async fn forward_lines<R>(
    reader: R,
    stream: OutputStream,
    ctx: ExecutionContext,
    tail: Arc<Mutex<VecDeque<String>>>,
) -> Option<String>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut last = None;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(index = ctx.index, error = %e, "output stream closed");
                break;
            }
        }

        let line = String::from_utf8_lossy(&buf)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        if !line.trim().is_empty() {
            last = Some(line.clone());
        }

        if ctx.max_captured_lines > 0 {
            let mut tail = tail.lock().await;
            if tail.len() == ctx.max_captured_lines {
                tail.pop_front();
            }
            tail.push_back(line.clone());
        }

        ctx.emit_output(stream, line);
    }

    last
}

async fn drain(reader: tokio::task::JoinHandle<Option<String>>) -> Option<String> {
    let abort = reader.abort_handle();
    match tokio::time::timeout(READER_DRAIN_TIMEOUT, reader).await {
        Ok(Ok(last)) => last,
        Ok(Err(_)) => None,
        Err(_) => {
            abort.abort();
            None
        }
    }
}

/// Ask the process to stop, then kill it after `grace_period`
async fn terminate(child: &mut Child, grace_period: Duration) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: kill(2) has no memory-safety preconditions; pid belongs to a
        // child we have not reaped yet.
        let sent = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) } == 0;
        if sent {
            if let Ok(result) = tokio::time::timeout(grace_period, child.wait()).await {
                if let Err(e) = result {
                    tracing::debug!(error = %e, "wait after SIGTERM failed");
                }
                return;
            }
            tracing::warn!(
                pid,
                grace_period_ms = grace_period.as_millis() as u64,
                "converter ignored SIGTERM, killing it"
            );
        }
    }

    #[cfg(not(unix))]
    let _ = grace_period;

    if let Err(e) = child.kill().await {
        tracing::warn!(error = %e, "failed to kill converter process");
    }
}
