//! # chunker-batch
//!
//! Batch front end for the Chunker Minecraft world converter.
//!
//! Chunker converts one world per invocation (`java -jar chunker-cli.jar -i <world>
//! -o <output> -f <format>`). This crate converts a whole directory of worlds:
//! it fetches converter releases, finds a suitable Java runtime, builds one job per
//! world, and runs the jobs with bounded concurrency, reporting progress as events.
//!
//! ## Quick Start
//!
//! ```no_run
//! use chunker_batch::{ChunkerLauncher, Config, ConvertRequest, Edition, TargetFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let launcher = ChunkerLauncher::new(Config::default()).await?;
//!     let artifact = launcher.download("latest").await?;
//!
//!     let request = ConvertRequest {
//!         input_dir: "saves".into(),
//!         output_dir: "output".into(),
//!         source_edition: Edition::Java,
//!         target_edition: Edition::Bedrock,
//!         target_format: TargetFormat::parse("BEDROCK_1_21_70"),
//!         runtime_path: None,
//!         artifact_path: artifact,
//!     };
//!
//!     let batch = launcher.prepare_batch(&request).await?;
//!     let mut handle = launcher.start_batch(batch);
//!     while let Some(event) = handle.next_event().await {
//!         println!("{:?}", event);
//!     }
//!
//!     let summary = handle.wait().await?;
//!     println!("{} of {} worlds converted", summary.succeeded, summary.total());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Batch execution
pub mod batch;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Target format catalog
pub mod formats;
/// Conversion job descriptions
pub mod jobs;
/// High-level launcher
pub mod launcher;
/// Converter releases and artifact cache
pub mod release;
/// Retry logic with exponential backoff
pub mod retry;
/// Java runtime discovery
pub mod runtime;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use batch::{BatchHandle, BatchRun, BatchRunner, JobExecutor, ProcessExecutor};
pub use config::Config;
pub use error::{Error, JobError, ReleaseError, Result, RuntimeError};
pub use jobs::{ConversionJob, Invocation};
pub use launcher::{ChunkerLauncher, ConvertRequest};
pub use types::{
    BatchEvent, BatchSummary, Edition, Event, JobReport, JobStatus, OutputStream, TargetFormat,
    ToolArtifact,
};

/// Cancel `token` when the process receives a termination signal
///
/// Spawns a background task that waits for SIGTERM or SIGINT (Ctrl+C elsewhere)
/// and cancels the token once. Useful to stop a batch gracefully:
///
/// ```no_run
/// # async fn example(launcher: chunker_batch::ChunkerLauncher, batch: std::sync::Arc<chunker_batch::BatchRun>) {
/// let handle = launcher.start_batch(batch);
/// chunker_batch::cancel_on_shutdown_signal(handle.cancellation_token());
/// # }
/// ```
pub fn cancel_on_shutdown_signal(
    token: tokio_util::sync::CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_signal() => token.cancel(),
            _ = token.cancelled() => {}
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("received SIGTERM, cancelling batch");
                }
                _ = sigint.recv() => {
                    tracing::info!("received SIGINT, cancelling batch");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "could not register SIGTERM handler, waiting for SIGINT only");
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
            tracing::info!("received SIGINT, cancelling batch");
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("received SIGTERM, cancelling batch");
            } else {
                tracing::error!("could not register any signal handler, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("received Ctrl+C, cancelling batch");
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}
