//! Error types for chunker-batch
//!
//! Errors fall into two groups that are handled differently:
//! - Configuration-time errors (release index, downloads, runtime validation,
//!   empty input) abort a batch before any job runs.
//! - Per-job errors ([`JobError`]) are recorded against a single world and never
//!   abort the rest of the batch.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for chunker-batch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for chunker-batch
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "batch.max_concurrent_jobs")
        key: Option<String>,
    },

    /// Release index or artifact download error
    #[error("release error: {0}")]
    Release(#[from] ReleaseError),

    /// Java runtime misconfiguration
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// Per-job failure (launch or non-zero exit)
    #[error("job error: {0}")]
    Job(#[from] JobError),

    /// The input directory contains no world subdirectories
    #[error("no world directories found in {}", path.display())]
    EmptyInput {
        /// The input directory that was scanned
        path: PathBuf,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error tied to a specific local path (cache, output, input directories)
    #[error("disk error at {}: {source}", path.display())]
    Disk {
        /// The path that could not be read or written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Insufficient disk space
    #[error("insufficient disk space: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Number of bytes required for the operation
        required: u64,
        /// Number of bytes currently available on disk
        available: u64,
    },

    /// Failed to check disk space
    #[error("failed to check disk space: {0}")]
    DiskSpaceCheckFailed(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Release index and artifact download errors
#[derive(Debug, Error)]
pub enum ReleaseError {
    /// The release index or download host could not be reached
    #[error("{url} is unreachable: {reason}")]
    Unreachable {
        /// The URL that was requested
        url: String,
        /// Why the request failed (HTTP status, connect error, timeout)
        reason: String,
    },

    /// The release index response could not be parsed
    #[error("malformed release index from {url}: {reason}")]
    Parse {
        /// The URL of the index
        url: String,
        /// Parser error message
        reason: String,
    },

    /// The requested version is not (or no longer) published
    #[error("version {tag} is not published")]
    NotFound {
        /// The version tag that was requested
        tag: String,
    },

    /// Downloaded artifact does not match the published digest
    #[error("checksum mismatch for {tag}: expected {expected}, got {actual}")]
    Checksum {
        /// The version tag that was downloaded
        tag: String,
        /// Digest published by the release index
        expected: String,
        /// Digest of the downloaded bytes
        actual: String,
    },
}

/// Java runtime errors
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Path is not a runnable Java executable
    #[error("{} is not a usable Java executable: {reason}", path.display())]
    InvalidExecutable {
        /// The candidate path
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },

    /// Reported Java version is below the required minimum
    #[error("Java {found} at {} is too old, version {required}+ required", path.display())]
    IncompatibleRuntime {
        /// The candidate path
        path: PathBuf,
        /// The version string reported by the runtime
        found: String,
        /// The minimum required major version
        required: u32,
    },
}

/// Errors isolated to a single conversion job
#[derive(Debug, Error)]
pub enum JobError {
    /// The converter process could not be started (missing runtime or artifact)
    #[error("failed to launch {} for world {world}: {reason}", program.display())]
    SubprocessLaunch {
        /// The world being converted
        world: String,
        /// The program that failed to start
        program: PathBuf,
        /// OS error message
        reason: String,
    },

    /// The converter exited with a non-zero status
    #[error("converter exited with {} for world {world}", code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}")))]
    ExitCode {
        /// The world being converted
        world: String,
        /// Exit code, if the process exited normally
        code: Option<i32>,
    },

    /// The per-world output directory could not be created
    #[error("failed to create output directory {} for world {world}: {reason}", path.display())]
    OutputDirectory {
        /// The world being converted
        world: String,
        /// The output directory
        path: PathBuf,
        /// OS error message
        reason: String,
    },
}

impl Error {
    /// Machine-readable error code
    ///
    /// Stable identifiers suitable for logs and scripting (the CLI prints them
    /// alongside the human-readable message).
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Release(ReleaseError::Unreachable { .. }) => "network_error",
            Error::Release(ReleaseError::Parse { .. }) => "parse_error",
            Error::Release(ReleaseError::NotFound { .. }) => "not_found",
            Error::Release(ReleaseError::Checksum { .. }) => "checksum_mismatch",
            Error::Runtime(RuntimeError::InvalidExecutable { .. }) => "invalid_executable",
            Error::Runtime(RuntimeError::IncompatibleRuntime { .. }) => "incompatible_runtime",
            Error::Job(JobError::SubprocessLaunch { .. }) => "subprocess_launch_error",
            Error::Job(JobError::ExitCode { .. }) => "job_failure",
            Error::Job(JobError::OutputDirectory { .. }) => "job_output_error",
            Error::EmptyInput { .. } => "empty_input",
            Error::Io(_) | Error::Disk { .. } => "disk_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::InsufficientSpace { .. } => "insufficient_space",
            Error::DiskSpaceCheckFailed(_) => "disk_space_check_failed",
            Error::Other(_) => "internal_error",
        }
    }

    /// Wrap an I/O error with the path it concerns
    pub(crate) fn disk(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Disk {
            path: path.into(),
            source,
        }
    }
}
