//! High-level entry point tying releases, runtime, job building and execution together

use crate::batch::{BatchHandle, BatchRun, BatchRunner, JobExecutor, ProcessExecutor};
use crate::config::Config;
use crate::error::{Error, Result, RuntimeError};
use crate::jobs::{BuildOptions, BuildRequest, JobBuilder, retain_worlds};
use crate::release::ReleaseFetcher;
use crate::runtime::{RuntimeInfo, RuntimeLocator};
use crate::types::{BatchSummary, Edition, Event, TargetFormat, ToolArtifact};
use crate::utils::ensure_dir;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Version selector accepted by [`ChunkerLauncher::download`] for the newest release
pub const LATEST: &str = "latest";

/// Everything a batch conversion needs from the caller
#[derive(Clone, Debug)]
pub struct ConvertRequest {
    /// Directory whose immediate subdirectories are worlds
    pub input_dir: PathBuf,
    /// Root of the converted worlds (created if missing)
    pub output_dir: PathBuf,
    /// Edition of the input worlds
    pub source_edition: Edition,
    /// Edition to convert to
    pub target_edition: Edition,
    /// Format identifier passed to the converter
    pub target_format: TargetFormat,
    /// Java runtime to use instead of the configured/located one
    pub runtime_path: Option<PathBuf>,
    /// Converter archive
    pub artifact_path: PathBuf,
}

/// Batch conversion launcher (cloneable, all state is shared)
#[derive(Clone)]
pub struct ChunkerLauncher {
    config: Arc<Config>,
    event_tx: broadcast::Sender<Event>,
    releases: ReleaseFetcher,
    locator: RuntimeLocator,
    executor: Arc<dyn JobExecutor>,
}

impl ChunkerLauncher {
    /// Create a launcher that runs jobs as real converter processes
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for invalid settings, [`Error::Disk`] if the artifact
    /// cache directory cannot be created.
    pub async fn new(config: Config) -> Result<Self> {
        Self::with_executor(config, Arc::new(ProcessExecutor::new())).await
    }

    /// Create a launcher with a custom job executor
    pub async fn with_executor(config: Config, executor: Arc<dyn JobExecutor>) -> Result<Self> {
        config.validate()?;
        ensure_dir(&config.release.cache_dir).await?;

        // Slow subscribers lag rather than block the batch
        let (event_tx, _rx) = broadcast::channel(1000);
        let releases = ReleaseFetcher::new(
            config.release.clone(),
            config.disk_space.clone(),
            event_tx.clone(),
        )?;
        let locator = RuntimeLocator::new(config.runtime.clone());

        Ok(Self {
            config: Arc::new(config),
            event_tx,
            releases,
            locator,
            executor,
        })
    }

    /// Subscribe to launcher events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The launcher's configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Published converter versions, newest first
    pub async fn list_versions(&self) -> Result<Vec<ToolArtifact>> {
        self.releases.list_versions().await
    }

    /// Download a version (or [`LATEST`]) and return the local artifact path
    pub async fn download(&self, tag: &str) -> Result<PathBuf> {
        if tag.eq_ignore_ascii_case(LATEST) {
            let versions = self.releases.list_versions().await?;
            let newest = versions
                .first()
                .ok_or_else(|| crate::error::ReleaseError::NotFound {
                    tag: LATEST.to_string(),
                })?;
            return self.releases.download_artifact(newest).await;
        }

        self.releases.download(tag).await
    }

    /// Artifacts already available locally
    pub async fn cached_artifacts(&self) -> Result<Vec<ToolArtifact>> {
        self.releases.cached_artifacts().await
    }

    /// Check that `path` is a Java runtime of the required version
    pub async fn validate_runtime(&self, path: &Path) -> Result<RuntimeInfo> {
        let info = self.locator.validate(path).await?;
        self.event_tx
            .send(Event::RuntimeDetected {
                path: info.path.clone(),
                version: info.version.clone(),
            })
            .ok();
        Ok(info)
    }

    /// Pick the runtime for a batch
    ///
    /// `explicit` overrides discovery. A runtime that reports a too-old version is
    /// rejected; one that cannot be validated at all is used anyway after a
    /// [`Event::RuntimeWarning`], and jobs fail at launch if it does not work.
    pub async fn resolve_runtime(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        let candidate = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => self.locator.locate(),
        };

        let Some(candidate) = candidate else {
            let fallback = self.locator.program();
            self.warn_runtime(format!(
                "no Java runtime found, falling back to '{}'",
                fallback.display()
            ));
            return Ok(fallback);
        };

        match self.validate_runtime(&candidate).await {
            Ok(info) => Ok(info.path),
            Err(Error::Runtime(RuntimeError::InvalidExecutable { path, reason })) => {
                self.warn_runtime(format!(
                    "could not validate Java at {}: {}; trying it anyway",
                    path.display(),
                    reason
                ));
                Ok(candidate)
            }
            Err(e) => Err(e),
        }
    }

    /// Resolve the runtime, create the output root and build the jobs
    ///
    /// Nothing has run when this returns; any error here aborts the batch.
    pub async fn prepare_batch(&self, request: &ConvertRequest) -> Result<Arc<BatchRun>> {
        tokio::fs::metadata(&request.artifact_path)
            .await
            .map_err(|e| Error::disk(&request.artifact_path, e))?;

        let runtime_path = self.resolve_runtime(request.runtime_path.as_deref()).await?;
        ensure_dir(&request.output_dir).await?;

        let build = BuildRequest {
            input_dir: request.input_dir.clone(),
            output_dir: request.output_dir.clone(),
            source_edition: request.source_edition,
            target_edition: request.target_edition,
            target_format: request.target_format.clone(),
            runtime_path,
            artifact_path: request.artifact_path.clone(),
        };
        let jobs = JobBuilder::new(BuildOptions::from(&self.config.batch))
            .build(&build)
            .await?;

        Ok(Arc::new(BatchRun::new(jobs)))
    }

    /// Start running a prepared batch
    pub fn start_batch(&self, batch: Arc<BatchRun>) -> BatchHandle {
        BatchRunner::new(Arc::clone(&self.executor), &self.config.batch)
            .with_event_sender(self.event_tx.clone())
            .run(batch)
    }

    /// Prepare a new batch containing only the worlds that failed in `summary`
    ///
    /// # Errors
    ///
    /// [`Error::EmptyInput`] when nothing failed, or none of the failed worlds
    /// is still present in the input directory.
    pub async fn retry_failed(
        &self,
        request: &ConvertRequest,
        summary: &BatchSummary,
    ) -> Result<Arc<BatchRun>> {
        let failed = summary.failed_worlds();
        if failed.is_empty() {
            return Err(Error::EmptyInput {
                path: request.input_dir.clone(),
            });
        }

        let prepared = self.prepare_batch(request).await?;
        let jobs = retain_worlds(prepared.jobs().to_vec(), &failed);
        if jobs.is_empty() {
            return Err(Error::EmptyInput {
                path: request.input_dir.clone(),
            });
        }

        tracing::info!(jobs = jobs.len(), "retrying failed worlds");
        Ok(Arc::new(BatchRun::new(jobs)))
    }

    fn warn_runtime(&self, message: String) {
        tracing::warn!(message = %message, "runtime not validated");
        self.event_tx.send(Event::RuntimeWarning { message }).ok();
    }
}
