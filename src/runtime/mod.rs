//! Java runtime discovery and validation
//!
//! The converter is a Java archive, so every job launches a Java runtime. This
//! module finds one ([`RuntimeLocator::locate`]) and checks that it is recent
//! enough ([`RuntimeLocator::validate`]).
//!
//! Not finding a runtime is not an error by itself: [`RuntimeLocator::program`]
//! falls back to the bare command name and each job then fails at launch if the
//! command does not exist.
//!
//! ```no_run
//! use chunker_batch::config::RuntimeConfig;
//! use chunker_batch::runtime::RuntimeLocator;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let locator = RuntimeLocator::new(RuntimeConfig::default());
//! if let Some(java) = locator.locate() {
//!     let info = locator.validate(&java).await?;
//!     println!("Java {} at {}", info.version, info.path.display());
//! }
//! # Ok(())
//! # }
//! ```

mod version;

pub use version::{JavaVersion, major_version, parse_java_version};

use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// A validated Java runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInfo {
    /// Path of the executable
    pub path: PathBuf,
    /// Version string reported by `-version`
    pub version: String,
    /// Major version
    pub major: u32,
}

/// File name of the Java launcher on this platform
pub fn java_binary_name() -> &'static str {
    if cfg!(windows) { "java.exe" } else { "java" }
}

/// Finds and validates Java runtimes
#[derive(Debug, Clone)]
pub struct RuntimeLocator {
    config: RuntimeConfig,
}

impl RuntimeLocator {
    /// Create a locator from runtime settings
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }

    /// Minimum major version this locator accepts
    pub fn min_major_version(&self) -> u32 {
        self.config.min_major_version
    }

    /// Find a runtime without running it
    ///
    /// Order: explicit `java_path`, then `<java_home>/bin/java` (configured home or
    /// the `JAVA_HOME` environment variable), then `java` on `PATH` when
    /// `search_path` is enabled.
    pub fn locate(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config.java_path {
            return Some(path.clone());
        }

        let home = self
            .config
            .java_home
            .clone()
            .or_else(|| std::env::var_os("JAVA_HOME").map(PathBuf::from));
        if let Some(home) = home {
            let candidate = home.join("bin").join(java_binary_name());
            if candidate.is_file() {
                debug!(path = %candidate.display(), "found runtime in java home");
                return Some(candidate);
            }
        }

        if self.config.search_path {
            return which::which("java").ok();
        }

        None
    }

    /// Program to launch jobs with: the located runtime or the bare command name
    pub fn program(&self) -> PathBuf {
        self.locate()
            .unwrap_or_else(|| PathBuf::from(java_binary_name()))
    }

    /// Run `<candidate> -version` and check the reported version
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::InvalidExecutable`] if the candidate cannot be run, times
    ///   out, or does not print a Java version banner
    /// - [`RuntimeError::IncompatibleRuntime`] if the major version is below
    ///   `min_major_version`
    pub async fn validate(&self, candidate: &Path) -> Result<RuntimeInfo> {
        let invalid = |reason: String| RuntimeError::InvalidExecutable {
            path: candidate.to_path_buf(),
            reason,
        };

        let mut command = Command::new(candidate);
        command
            .arg("-version")
            .stdin(Stdio::null())
            .kill_on_drop(true);
        crate::utils::hide_console_window(&mut command);

        let output = match tokio::time::timeout(self.config.probe_timeout, command.output()).await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(invalid(e.to_string()).into()),
            Err(_) => {
                return Err(invalid(format!(
                    "no answer to -version within {:?}",
                    self.config.probe_timeout
                ))
                .into());
            }
        };

        // Java prints its banner on stderr
        let stderr = String::from_utf8_lossy(&output.stderr);
        let banner = if stderr.trim().is_empty() {
            String::from_utf8_lossy(&output.stdout)
        } else {
            stderr
        };

        let version = parse_java_version(&banner)
            .ok_or_else(|| invalid("no Java version in -version output".to_string()))?;

        if version.major < self.config.min_major_version {
            return Err(RuntimeError::IncompatibleRuntime {
                path: candidate.to_path_buf(),
                found: version.raw,
                required: self.config.min_major_version,
            }
            .into());
        }

        info!(
            path = %candidate.display(),
            version = %version.raw,
            "validated Java runtime"
        );

        Ok(RuntimeInfo {
            path: candidate.to_path_buf(),
            version: version.raw,
            major: version.major,
        })
    }
}
