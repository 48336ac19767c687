//! Batch execution
//!
//! A [`BatchRun`] owns the jobs of one batch, their statuses, and the batch's
//! cancellation token. [`BatchRunner::run`] dispatches the jobs in order, at most
//! `max_concurrent_jobs` at a time, and returns a [`BatchHandle`] that streams
//! [`BatchEvent`]s and resolves to a [`BatchSummary`].
//!
//! Guarantees:
//! - One job failing never stops the others.
//! - Status events for a job arrive in transition order
//!   (`pending → running → succeeded | failed | cancelled`), and all of a job's
//!   output lines arrive before its terminal status.
//! - After cancellation no new job is started; running jobs are asked to stop and
//!   the rest end up `cancelled`.
//!
//! ```no_run
//! use chunker_batch::batch::{BatchRun, BatchRunner, ProcessExecutor};
//! use chunker_batch::config::BatchConfig;
//! use std::sync::Arc;
//!
//! # async fn example(jobs: Vec<chunker_batch::ConversionJob>) -> chunker_batch::Result<()> {
//! let runner = BatchRunner::new(Arc::new(ProcessExecutor::new()), &BatchConfig::default());
//! let mut handle = runner.run(Arc::new(BatchRun::new(jobs)));
//!
//! while let Some(event) = handle.next_event().await {
//!     println!("{:?}", event);
//! }
//! let summary = handle.wait().await?;
//! println!("{} succeeded, {} failed", summary.succeeded, summary.failed);
//! # Ok(())
//! # }
//! ```

mod executor;

#[cfg(test)]
mod tests;

pub use executor::{ExecutionContext, JobExecutor, JobOutcome, ProcessExecutor};

use crate::config::BatchConfig;
use crate::error::{Error, Result};
use crate::jobs::ConversionJob;
use crate::types::{BatchEvent, BatchSummary, Event, JobReport, JobStatus};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{Semaphore, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

/// The jobs of one batch and their live statuses
#[derive(Debug)]
pub struct BatchRun {
    jobs: Vec<ConversionJob>,
    statuses: RwLock<Vec<JobStatus>>,
    cancel: CancellationToken,
}

impl BatchRun {
    /// New batch with every job pending
    pub fn new(jobs: Vec<ConversionJob>) -> Self {
        let statuses = vec![JobStatus::Pending; jobs.len()];
        Self {
            jobs,
            statuses: RwLock::new(statuses),
            cancel: CancellationToken::new(),
        }
    }

    /// Jobs in dispatch order
    pub fn jobs(&self) -> &[ConversionJob] {
        &self.jobs
    }

    /// Snapshot of all job statuses, by index
    pub fn statuses(&self) -> Vec<JobStatus> {
        self.statuses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Status of one job
    pub fn status(&self, index: usize) -> Option<JobStatus> {
        self.statuses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .copied()
    }

    /// Stop the batch: no new job starts and running jobs are asked to stop
    ///
    /// Idempotent.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!(jobs = self.jobs.len(), "batch cancellation requested");
        }
        self.cancel.cancel();
    }

    /// Whether [`cancel`](Self::cancel) has been called
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token cancelled together with the batch
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Apply a status transition; illegal transitions are ignored
    fn transition(&self, index: usize, next: JobStatus) -> bool {
        let mut statuses = self.statuses.write().unwrap_or_else(PoisonError::into_inner);
        let Some(current) = statuses.get_mut(index) else {
            return false;
        };

        if current.can_transition_to(next) {
            *current = next;
            true
        } else {
            tracing::warn!(
                index,
                from = %current,
                to = %next,
                "ignoring illegal job status transition"
            );
            false
        }
    }
}

/// Dispatches the jobs of a batch onto a [`JobExecutor`]
#[derive(Clone)]
pub struct BatchRunner {
    executor: Arc<dyn JobExecutor>,
    max_concurrent_jobs: usize,
    grace_period: Duration,
    max_captured_lines: usize,
    event_tx: Option<broadcast::Sender<Event>>,
}

impl BatchRunner {
    /// Create a runner from batch settings
    pub fn new(executor: Arc<dyn JobExecutor>, config: &BatchConfig) -> Self {
        Self {
            executor,
            max_concurrent_jobs: config.max_concurrent_jobs.max(1),
            grace_period: config.termination_grace_period,
            max_captured_lines: config.max_captured_lines,
            event_tx: None,
        }
    }

    /// Also report batch start and finish on a launcher event channel
    pub fn with_event_sender(mut self, event_tx: broadcast::Sender<Event>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Start running `batch` in the background
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run(&self, batch: Arc<BatchRun>) -> BatchHandle {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(drive(self.clone(), Arc::clone(&batch), events_tx));

        BatchHandle {
            batch,
            events: Some(events_rx),
            driver,
        }
    }
}

/// A running batch
pub struct BatchHandle {
    batch: Arc<BatchRun>,
    events: Option<mpsc::UnboundedReceiver<BatchEvent>>,
    driver: JoinHandle<BatchSummary>,
}

impl BatchHandle {
    /// The batch being run
    pub fn batch(&self) -> &Arc<BatchRun> {
        &self.batch
    }

    /// Next batch event; `None` once the batch is finished and all events were read
    pub async fn next_event(&mut self) -> Option<BatchEvent> {
        match self.events.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Take the event stream (later calls get an already-finished stream)
    pub fn events(&mut self) -> UnboundedReceiverStream<BatchEvent> {
        let rx = self
            .events
            .take()
            .unwrap_or_else(|| mpsc::unbounded_channel().1);
        UnboundedReceiverStream::new(rx)
    }

    /// Cancel the batch
    pub fn cancel(&self) {
        self.batch.cancel();
    }

    /// Token cancelled together with the batch
    pub fn cancellation_token(&self) -> CancellationToken {
        self.batch.cancellation_token()
    }

    /// Wait for every job to reach a terminal status
    pub async fn wait(self) -> Result<BatchSummary> {
        self.driver
            .await
            .map_err(|e| Error::Other(format!("batch driver task failed: {}", e)))
    }
}

async fn drive(
    runner: BatchRunner,
    batch: Arc<BatchRun>,
    events: mpsc::UnboundedSender<BatchEvent>,
) -> BatchSummary {
    let total = batch.jobs.len();
    let semaphore = Arc::new(Semaphore::new(runner.max_concurrent_jobs));

    for (index, job) in batch.jobs.iter().enumerate() {
        send_status(&events, index, job, JobStatus::Pending, "queued".to_string());
    }
    if let Some(tx) = &runner.event_tx {
        tx.send(Event::BatchStarted { jobs: total }).ok();
    }
    tracing::info!(
        jobs = total,
        max_concurrent = runner.max_concurrent_jobs,
        "batch started"
    );

    let mut running = Vec::with_capacity(total);
    let mut dispatched = 0;

    while dispatched < total {
        let permit = tokio::select! {
            biased;
            _ = batch.cancel.cancelled() => break,
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let index = dispatched;
        dispatched += 1;

        let job = batch.jobs[index].clone();
        batch.transition(index, JobStatus::Running);
        send_status(
            &events,
            index,
            &job,
            JobStatus::Running,
            format!("converting {}", job.world_path.display()),
        );

        let ctx = ExecutionContext::new(
            index,
            batch.cancellation_token(),
            runner.grace_period,
            runner.max_captured_lines,
            events.clone(),
        );
        let executor = Arc::clone(&runner.executor);
        let batch_ref = Arc::clone(&batch);
        let events_ref = events.clone();
        let handle = tokio::spawn(async move {
            let _permit = permit;
            let outcome = executor.execute(&job, ctx).await;
            finish(&batch_ref, &events_ref, index, &job, outcome)
        });
        running.push((index, handle));
    }

    let mut reports = Vec::with_capacity(total);

    // Never dispatched: the batch was cancelled first
    for index in dispatched..total {
        let job = &batch.jobs[index];
        batch.transition(index, JobStatus::Cancelled);
        send_status(
            &events,
            index,
            job,
            JobStatus::Cancelled,
            "cancelled before start".to_string(),
        );
        reports.push(report(index, job, JobOutcome::cancelled(Vec::new())));
    }

    for (index, handle) in running {
        match handle.await {
            Ok(report) => reports.push(report),
            Err(e) => {
                let outcome = JobOutcome {
                    status: JobStatus::Failed,
                    exit_code: None,
                    message: format!("job task failed: {}", e),
                    output: Vec::new(),
                };
                let job = &batch.jobs[index];
                reports.push(finish(&batch, &events, index, job, outcome));
            }
        }
    }

    let summary = BatchSummary::from_reports(reports);
    tracing::info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        cancelled = summary.cancelled,
        "batch finished"
    );
    if let Some(tx) = &runner.event_tx {
        tx.send(Event::BatchFinished {
            succeeded: summary.succeeded,
            failed: summary.failed,
            cancelled: summary.cancelled,
        })
        .ok();
    }

    summary
}

/// Record a job's terminal status and emit it
fn finish(
    batch: &BatchRun,
    events: &mpsc::UnboundedSender<BatchEvent>,
    index: usize,
    job: &ConversionJob,
    mut outcome: JobOutcome,
) -> JobReport {
    if !outcome.status.is_terminal() {
        outcome.message = format!("executor returned non-terminal status {}", outcome.status);
        outcome.status = JobStatus::Failed;
    }

    batch.transition(index, outcome.status);
    send_status(events, index, job, outcome.status, outcome.message.clone());
    report(index, job, outcome)
}

fn send_status(
    events: &mpsc::UnboundedSender<BatchEvent>,
    index: usize,
    job: &ConversionJob,
    status: JobStatus,
    message: String,
) {
    events
        .send(BatchEvent::Status {
            index,
            world: job.world_name(),
            status,
            message,
        })
        .ok();
}

fn report(index: usize, job: &ConversionJob, outcome: JobOutcome) -> JobReport {
    JobReport {
        index,
        world: job.world_name(),
        output_path: job.output_path.clone(),
        status: outcome.status,
        exit_code: outcome.exit_code,
        message: outcome.message,
        output: outcome.output,
    }
}
