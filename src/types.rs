//! Core types for chunker-batch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::formats;

/// Minecraft world storage variant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edition {
    /// Java Edition (Anvil region files)
    Java,
    /// Bedrock Edition (LevelDB)
    Bedrock,
}

impl Edition {
    /// Both editions, in display order
    pub const ALL: [Edition; 2] = [Edition::Java, Edition::Bedrock];

    /// Prefix used by format identifiers of this edition (`JAVA_`, `BEDROCK_`)
    pub fn format_prefix(&self) -> &'static str {
        match self {
            Edition::Java => "JAVA_",
            Edition::Bedrock => "BEDROCK_",
        }
    }
}

impl std::fmt::Display for Edition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edition::Java => write!(f, "Java"),
            Edition::Bedrock => write!(f, "Bedrock"),
        }
    }
}

impl std::str::FromStr for Edition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "java" => Ok(Edition::Java),
            "bedrock" => Ok(Edition::Bedrock),
            other => Err(format!("unknown edition '{}' (expected java or bedrock)", other)),
        }
    }
}

/// Output format handed to the converter's `-f` argument
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TargetFormat {
    /// An identifier from the built-in catalog
    Known {
        /// Edition the identifier belongs to
        edition: Edition,
        /// Identifier, e.g. `BEDROCK_1_21_70`
        id: String,
    },
    /// Any other identifier, passed through verbatim
    Custom(String),
}

impl TargetFormat {
    /// Classify an identifier: catalog entries become `Known`, anything else `Custom`
    pub fn parse(id: &str) -> Self {
        match formats::edition_of(id) {
            Some(edition) => TargetFormat::Known {
                edition,
                id: id.to_string(),
            },
            None => TargetFormat::Custom(id.to_string()),
        }
    }

    /// The identifier as passed to the converter
    pub fn as_str(&self) -> &str {
        match self {
            TargetFormat::Known { id, .. } => id,
            TargetFormat::Custom(id) => id,
        }
    }

    /// Edition implied by the identifier, if it can be told
    ///
    /// Custom identifiers are inspected for a `JAVA_`/`BEDROCK_` prefix.
    pub fn edition(&self) -> Option<Edition> {
        match self {
            TargetFormat::Known { edition, .. } => Some(*edition),
            TargetFormat::Custom(id) => Edition::ALL
                .into_iter()
                .find(|e| id.to_ascii_uppercase().starts_with(e.format_prefix())),
        }
    }
}

impl std::fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One published release of the converter
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolArtifact {
    /// Release tag, e.g. `1.7.0`
    pub version_tag: String,
    /// Asset file name, e.g. `chunker-cli-1.7.0.jar`
    pub jar_name: String,
    /// Direct download location of the asset
    pub download_url: String,
    /// When the release was published
    pub published_at: Option<DateTime<Utc>>,
    /// Asset size in bytes, if published
    pub size: Option<u64>,
    /// Hex SHA-256 of the asset, if published
    pub sha256: Option<String>,
    /// Where the artifact lives locally, once downloaded or found in the cache
    pub local_path: Option<PathBuf>,
}

/// Status of one conversion job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting to be dispatched
    Pending,
    /// Converter process is running
    Running,
    /// Converter exited with code 0
    Succeeded,
    /// Converter exited non-zero or could not be started
    Failed,
    /// Cancelled before or during execution
    Cancelled,
}

impl JobStatus {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether `self -> next` is a legal transition
    ///
    /// `Pending -> Running -> terminal`, plus `Pending -> Cancelled` for jobs that are
    /// cancelled before dispatch and `Pending -> Failed` for jobs whose launch fails
    /// before a process exists.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            JobStatus::Pending => matches!(
                next,
                JobStatus::Running | JobStatus::Cancelled | JobStatus::Failed
            ),
            JobStatus::Running => next.is_terminal(),
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Which converter stream a line came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

/// Event produced by a running batch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    /// A job changed status
    Status {
        /// Index of the job in the batch
        index: usize,
        /// World directory name
        world: String,
        /// New status
        status: JobStatus,
        /// Human-readable description of the transition
        message: String,
    },

    /// A line of converter output, verbatim
    Output {
        /// Index of the job in the batch
        index: usize,
        /// Source stream
        stream: OutputStream,
        /// The line, without its trailing newline
        line: String,
    },
}

impl BatchEvent {
    /// Index of the job this event belongs to
    pub fn index(&self) -> usize {
        match self {
            BatchEvent::Status { index, .. } | BatchEvent::Output { index, .. } => *index,
        }
    }
}

/// Event emitted by the launcher outside of batch execution
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Release index fetched
    ReleasesListed {
        /// Number of releases carrying a converter artifact
        count: usize,
    },

    /// Artifact download started
    DownloadStarted {
        /// Version tag
        tag: String,
        /// Expected size in bytes, if known
        #[serde(skip_serializing_if = "Option::is_none")]
        total_bytes: Option<u64>,
    },

    /// Artifact download progress
    DownloadProgress {
        /// Version tag
        tag: String,
        /// Bytes written so far
        downloaded_bytes: u64,
        /// Progress percentage (0.0 to 100.0), if the size is known
        #[serde(skip_serializing_if = "Option::is_none")]
        percent: Option<f32>,
    },

    /// Artifact download finished
    DownloadComplete {
        /// Version tag
        tag: String,
        /// Final location
        path: PathBuf,
    },

    /// Artifact download failed
    DownloadFailed {
        /// Version tag
        tag: String,
        /// Error message
        error: String,
    },

    /// Artifact was already cached; no download happened
    ArtifactCached {
        /// Version tag
        tag: String,
        /// Cached location
        path: PathBuf,
    },

    /// A Java runtime was validated
    RuntimeDetected {
        /// Path of the runtime
        path: PathBuf,
        /// Reported version string
        version: String,
    },

    /// Runtime could not be validated but the batch goes ahead
    RuntimeWarning {
        /// Why validation did not succeed
        message: String,
    },

    /// A batch started
    BatchStarted {
        /// Number of jobs in the batch
        jobs: usize,
    },

    /// A batch finished
    BatchFinished {
        /// Jobs that succeeded
        succeeded: usize,
        /// Jobs that failed
        failed: usize,
        /// Jobs that were cancelled
        cancelled: usize,
    },
}

/// Final record of one job
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    /// Index of the job in the batch
    pub index: usize,
    /// World directory name
    pub world: String,
    /// Where the converted world was written
    pub output_path: PathBuf,
    /// Terminal status
    pub status: JobStatus,
    /// Converter exit code, when the process exited normally
    pub exit_code: Option<i32>,
    /// Summary message (error text for failures)
    pub message: String,
    /// Tail of the converter's output, in arrival order
    pub output: Vec<String>,
}

/// Aggregate result of a batch
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Jobs that succeeded
    pub succeeded: usize,
    /// Jobs that failed
    pub failed: usize,
    /// Jobs that were cancelled
    pub cancelled: usize,
    /// Per-job reports, ordered by job index
    pub reports: Vec<JobReport>,
}

impl BatchSummary {
    /// Build a summary from per-job reports (sorted by index)
    pub fn from_reports(mut reports: Vec<JobReport>) -> Self {
        reports.sort_by_key(|r| r.index);
        let count = |status: JobStatus| reports.iter().filter(|r| r.status == status).count();

        Self {
            succeeded: count(JobStatus::Succeeded),
            failed: count(JobStatus::Failed),
            cancelled: count(JobStatus::Cancelled),
            reports,
        }
    }

    /// Total number of jobs
    pub fn total(&self) -> usize {
        self.reports.len()
    }

    /// True when every job succeeded
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }

    /// Names of worlds whose job failed
    pub fn failed_worlds(&self) -> Vec<String> {
        self.reports
            .iter()
            .filter(|r| r.status == JobStatus::Failed)
            .map(|r| r.world.clone())
            .collect()
    }
}
