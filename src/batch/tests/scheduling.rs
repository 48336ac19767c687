use super::*;
use crate::error::JobError;
use crate::types::OutputStream;
use std::collections::HashSet;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// What a scripted job does
#[derive(Clone, Copy)]
enum Script {
    Succeed,
    Fail,
    /// Run until cancelled
    Block,
}

/// Executor that follows a script per world and records what it was asked to run
struct ScriptedExecutor {
    failing: HashSet<usize>,
    blocking: HashSet<usize>,
    delay: Duration,
    started: StdMutex<Vec<usize>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedExecutor {
    fn new() -> Self {
        Self {
            failing: HashSet::new(),
            blocking: HashSet::new(),
            delay: Duration::from_millis(10),
            started: StdMutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    fn failing(mut self, index: usize) -> Self {
        self.failing.insert(index);
        self
    }

    fn blocking(mut self, index: usize) -> Self {
        self.blocking.insert(index);
        self
    }

    fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn script(&self, index: usize) -> Script {
        if self.blocking.contains(&index) {
            Script::Block
        } else if self.failing.contains(&index) {
            Script::Fail
        } else {
            Script::Succeed
        }
    }

    fn started(&self) -> Vec<usize> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl JobExecutor for ScriptedExecutor {
    async fn execute(&self, job: &ConversionJob, ctx: ExecutionContext) -> JobOutcome {
        self.started.lock().unwrap().push(ctx.index);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        ctx.emit_output(OutputStream::Stdout, format!("converting {}", job.world_name()));

        let outcome = match self.script(ctx.index) {
            Script::Block => {
                ctx.cancel.cancelled().await;
                JobOutcome::cancelled(vec![])
            }
            script => {
                tokio::time::sleep(self.delay).await;
                if matches!(script, Script::Fail) {
                    let error = JobError::ExitCode {
                        world: job.world_name(),
                        code: Some(1),
                    };
                    JobOutcome::failed(&error, vec!["boom".to_string()])
                } else {
                    JobOutcome::succeeded(vec!["done".to_string()])
                }
            }
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

#[tokio::test]
async fn all_jobs_succeed_in_order() {
    let temp = TempDir::new().unwrap();
    let executor = Arc::new(ScriptedExecutor::new());
    let runner = BatchRunner::new(executor.clone(), &config(1));

    let mut handle = runner.run(Arc::new(BatchRun::new(jobs(temp.path(), 3))));
    let events = collect_events(&mut handle).await;
    let summary = handle.wait().await.unwrap();

    assert_eq!(summary.succeeded, 3);
    assert!(summary.is_success());
    assert_eq!(executor.started(), vec![0, 1, 2]);
    for index in 0..3 {
        assert_eq!(
            statuses_of(&events, index),
            vec![JobStatus::Pending, JobStatus::Running, JobStatus::Succeeded]
        );
    }
}

#[tokio::test]
async fn failure_does_not_stop_the_batch() {
    let temp = TempDir::new().unwrap();
    let executor = Arc::new(ScriptedExecutor::new().failing(2));
    let runner = BatchRunner::new(executor.clone(), &config(1));

    let mut handle = runner.run(Arc::new(BatchRun::new(jobs(temp.path(), 5))));
    let events = collect_events(&mut handle).await;
    let summary = handle.wait().await.unwrap();

    assert_eq!(summary.succeeded, 4);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failed_worlds(), vec!["world2".to_string()]);
    assert_eq!(executor.started(), vec![0, 1, 2, 3, 4]);

    let failed = &summary.reports[2];
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.exit_code, Some(1));
    assert!(failed.message.contains("world2"));
    assert_eq!(failed.output, vec!["boom".to_string()]);

    assert_eq!(
        statuses_of(&events, 2),
        vec![JobStatus::Pending, JobStatus::Running, JobStatus::Failed]
    );
}

#[tokio::test]
async fn cancel_stops_dispatch_and_cancels_pending_jobs() {
    let temp = TempDir::new().unwrap();
    let executor = Arc::new(ScriptedExecutor::new().blocking(1));
    let runner = BatchRunner::new(executor.clone(), &config(1));

    let mut handle = runner.run(Arc::new(BatchRun::new(jobs(temp.path(), 5))));

    // Wait until job 1 is running, then cancel
    loop {
        let event = handle.next_event().await.expect("stream ended early");
        if let BatchEvent::Status {
            index: 1,
            status: JobStatus::Running,
            ..
        } = event
        {
            break;
        }
    }
    handle.cancel();

    let batch = Arc::clone(handle.batch());
    let summary = tokio::time::timeout(Duration::from_secs(10), handle.wait())
        .await
        .expect("batch did not stop after cancel")
        .unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.cancelled, 4);
    assert_eq!(summary.failed, 0);
    assert_eq!(executor.started(), vec![0, 1]);
    assert_eq!(
        batch.statuses(),
        vec![
            JobStatus::Succeeded,
            JobStatus::Cancelled,
            JobStatus::Cancelled,
            JobStatus::Cancelled,
            JobStatus::Cancelled,
        ]
    );
}

#[tokio::test]
async fn cancel_before_start_runs_nothing() {
    let temp = TempDir::new().unwrap();
    let executor = Arc::new(ScriptedExecutor::new());
    let runner = BatchRunner::new(executor.clone(), &config(2));

    let batch = Arc::new(BatchRun::new(jobs(temp.path(), 3)));
    batch.cancel();
    batch.cancel();

    let mut handle = runner.run(batch);
    let events = collect_events(&mut handle).await;
    let summary = handle.wait().await.unwrap();

    assert_eq!(summary.cancelled, 3);
    assert!(executor.started().is_empty());
    assert_eq!(
        statuses_of(&events, 0),
        vec![JobStatus::Pending, JobStatus::Cancelled]
    );
}

#[tokio::test]
async fn output_arrives_between_running_and_terminal_status() {
    let temp = TempDir::new().unwrap();
    let executor = Arc::new(ScriptedExecutor::new());
    let runner = BatchRunner::new(executor, &config(3));

    let mut handle = runner.run(Arc::new(BatchRun::new(jobs(temp.path(), 3))));
    let events = collect_events(&mut handle).await;
    handle.wait().await.unwrap();

    for index in 0..3 {
        let for_job: Vec<&BatchEvent> = events.iter().filter(|e| e.index() == index).collect();
        let output_pos = for_job
            .iter()
            .position(|e| matches!(e, BatchEvent::Output { .. }))
            .expect("job produced output");
        let running_pos = for_job
            .iter()
            .position(|e| matches!(e, BatchEvent::Status { status: JobStatus::Running, .. }))
            .unwrap();
        let done_pos = for_job
            .iter()
            .position(|e| matches!(e, BatchEvent::Status { status: JobStatus::Succeeded, .. }))
            .unwrap();

        assert!(running_pos < output_pos && output_pos < done_pos);
    }
}

#[tokio::test]
async fn concurrency_is_bounded() {
    let temp = TempDir::new().unwrap();
    let executor = Arc::new(ScriptedExecutor::new().delay(Duration::from_millis(50)));
    let runner = BatchRunner::new(executor.clone(), &config(2));

    let handle = runner.run(Arc::new(BatchRun::new(jobs(temp.path(), 6))));
    let summary = handle.wait().await.unwrap();

    assert_eq!(summary.succeeded, 6);
    assert_eq!(executor.max_active.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn sequential_by_default() {
    let temp = TempDir::new().unwrap();
    let executor = Arc::new(ScriptedExecutor::new().delay(Duration::from_millis(20)));
    let runner = BatchRunner::new(executor.clone(), &BatchConfig::default());

    let handle = runner.run(Arc::new(BatchRun::new(jobs(temp.path(), 4))));
    handle.wait().await.unwrap();

    assert_eq!(executor.max_active.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn batch_lifecycle_is_reported_on_event_channel() {
    let temp = TempDir::new().unwrap();
    let (tx, mut rx) = broadcast::channel(100);
    let runner = BatchRunner::new(Arc::new(ScriptedExecutor::new().failing(0)), &config(1))
        .with_event_sender(tx);

    let handle = runner.run(Arc::new(BatchRun::new(jobs(temp.path(), 2))));
    handle.wait().await.unwrap();

    assert!(matches!(rx.recv().await.unwrap(), Event::BatchStarted { jobs: 2 }));
    assert!(matches!(
        rx.recv().await.unwrap(),
        Event::BatchFinished {
            succeeded: 1,
            failed: 1,
            cancelled: 0
        }
    ));
}

#[tokio::test]
async fn taken_event_stream_yields_everything() {
    use futures::StreamExt;

    let temp = TempDir::new().unwrap();
    let runner = BatchRunner::new(Arc::new(ScriptedExecutor::new()), &config(1));

    let mut handle = runner.run(Arc::new(BatchRun::new(jobs(temp.path(), 2))));
    let stream = handle.events();
    let events: Vec<BatchEvent> = stream.collect().await;

    // pending x2, then running + output + succeeded per job
    assert_eq!(events.len(), 8);
    assert_eq!(handle.next_event().await, None);
    assert_eq!(handle.wait().await.unwrap().succeeded, 2);
}

#[test]
fn terminal_statuses_are_final() {
    let batch = BatchRun::new(jobs(Path::new("/tmp"), 1));

    assert!(batch.transition(0, JobStatus::Running));
    assert!(batch.transition(0, JobStatus::Succeeded));
    assert!(!batch.transition(0, JobStatus::Running));
    assert!(!batch.transition(0, JobStatus::Cancelled));
    assert!(!batch.transition(7, JobStatus::Running));
    assert_eq!(batch.status(0), Some(JobStatus::Succeeded));
}
