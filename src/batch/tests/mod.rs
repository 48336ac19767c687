// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod scheduling;


use super::*;
use crate::types::{Edition, TargetFormat};
use std::path::{Path, PathBuf};

/// Jobs for worlds `world0..worldN` under `root`
pub(super) fn jobs(root: &Path, count: usize) -> Vec<ConversionJob> {
    (0..count)
        .map(|i| ConversionJob {
            world_path: root.join("input").join(format!("world{i}")),
            output_path: root.join("output").join(format!("world{i}")),
            source_edition: Edition::Java,
            target_edition: Edition::Bedrock,
            target_format: TargetFormat::parse("BEDROCK_1_21_70"),
            runtime_path: PathBuf::from("java"),
            tool_artifact_path: root.join("chunker-cli-1.7.0.jar"),
        })
        .collect()
}

pub(super) fn config(max_concurrent_jobs: usize) -> BatchConfig {
    BatchConfig {
        max_concurrent_jobs,
        termination_grace_period: Duration::from_millis(500),
        ..Default::default()
    }
}

/// Read every event until the batch closes the stream
pub(super) async fn collect_events(handle: &mut BatchHandle) -> Vec<BatchEvent> {
    let mut events = Vec::new();
    while let Some(event) =
        tokio::time::timeout(Duration::from_secs(30), handle.next_event())
            .await
            .expect("batch events stalled")
    {
        events.push(event);
    }
    events
}

/// Status sequence reported for one job
pub(super) fn statuses_of(events: &[BatchEvent], index: usize) -> Vec<JobStatus> {
    events
        .iter()
        .filter_map(|e| match e {
            BatchEvent::Status {
                index: i, status, ..
            } if *i == index => Some(*status),
            _ => None,
        })
        .collect()
}
