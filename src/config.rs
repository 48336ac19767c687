//! Configuration types for chunker-batch

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default release index (GitHub releases API for the Chunker project)
pub const DEFAULT_INDEX_URL: &str = "https://api.github.com/repos/HiveGamesOSS/Chunker/releases";

/// Release index and artifact cache settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReleaseConfig {
    /// URL of the release listing (GitHub releases JSON)
    #[serde(default = "default_index_url")]
    pub index_url: String,

    /// Asset file name prefix identifying the converter artifact (default: "chunker-cli-")
    #[serde(default = "default_asset_prefix")]
    pub asset_prefix: String,

    /// Asset file name suffix identifying the converter artifact (default: ".jar")
    #[serde(default = "default_asset_suffix")]
    pub asset_suffix: String,

    /// Directory holding downloaded artifacts, one subdirectory per version tag
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Extra directories scanned for already-present artifacts (e.g. the working directory)
    #[serde(default)]
    pub search_dirs: Vec<PathBuf>,

    /// HTTP request timeout (default: 30 seconds for the index; downloads are not bounded)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// User-Agent sent with every request (GitHub rejects requests without one)
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Verify downloads against the digest published in the index, when present
    #[serde(default = "default_true")]
    pub verify_checksums: bool,

    /// Retry behavior for transient network failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            index_url: default_index_url(),
            asset_prefix: default_asset_prefix(),
            asset_suffix: default_asset_suffix(),
            cache_dir: default_cache_dir(),
            search_dirs: Vec::new(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
            verify_checksums: true,
            retry: RetryConfig::default(),
        }
    }
}

/// Java runtime discovery and validation settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Explicit path to the java executable (auto-detected if None)
    #[serde(default)]
    pub java_path: Option<PathBuf>,

    /// Java home directory; `JAVA_HOME` from the environment is used when None
    #[serde(default)]
    pub java_home: Option<PathBuf>,

    /// Whether to search PATH for `java` if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Minimum supported Java major version (default: 17)
    #[serde(default = "default_min_major_version")]
    pub min_major_version: u32,

    /// Upper bound on `java -version` probing (default: 10 seconds)
    #[serde(default = "default_probe_timeout", with = "duration_serde")]
    pub probe_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            java_path: None,
            java_home: None,
            search_path: true,
            min_major_version: default_min_major_version(),
            probe_timeout: default_probe_timeout(),
        }
    }
}

/// How output directories are named
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputNaming {
    /// `<output>/<world>`
    #[default]
    WorldName,
    /// `<output>/<world>_<format lowercased>`, e.g. `world1_bedrock_1_21_70`
    WorldNameWithFormat,
}

/// Batch execution settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum converter processes running at once (default: 1 = sequential)
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Time a cancelled converter gets to exit before it is killed (default: 10 seconds)
    #[serde(default = "default_grace_period", with = "duration_serde")]
    pub termination_grace_period: Duration,

    /// Output directory naming scheme
    #[serde(default)]
    pub output_naming: OutputNaming,

    /// Skip subdirectories without world markers (level.dat, session.lock, db/)
    #[serde(default)]
    pub require_world_markers: bool,

    /// Number of converter output lines kept per job for the summary (default: 200)
    #[serde(default = "default_max_captured_lines")]
    pub max_captured_lines: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            termination_grace_period: default_grace_period(),
            output_naming: OutputNaming::default(),
            require_world_markers: false,
            max_captured_lines: default_max_captured_lines(),
        }
    }
}

/// Disk space checking configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiskSpaceConfig {
    /// Check available space before downloading artifacts (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Space that must remain free after a download, in bytes (default: 100 MB)
    #[serde(default = "default_min_free_space")]
    pub min_free_space: u64,
}

impl Default for DiskSpaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_free_space: default_min_free_space(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration for [`ChunkerLauncher`](crate::ChunkerLauncher)
///
/// Every field has a default, so an empty JSON object is a valid configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Release index and artifact cache
    #[serde(default)]
    pub release: ReleaseConfig,

    /// Java runtime discovery
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Batch execution
    #[serde(default)]
    pub batch: BatchConfig,

    /// Disk space checks
    #[serde(default)]
    pub disk_space: DiskSpaceConfig,
}

impl Config {
    /// Load a configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::disk(path, e))?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.batch.max_concurrent_jobs == 0 {
            return Err(Error::Config {
                message: "max_concurrent_jobs must be at least 1".to_string(),
                key: Some("batch.max_concurrent_jobs".to_string()),
            });
        }

        if let Err(e) = url::Url::parse(&self.release.index_url) {
            return Err(Error::Config {
                message: format!("invalid index URL '{}': {}", self.release.index_url, e),
                key: Some("release.index_url".to_string()),
            });
        }

        if self.release.asset_suffix.is_empty() && self.release.asset_prefix.is_empty() {
            return Err(Error::Config {
                message: "asset_prefix and asset_suffix cannot both be empty".to_string(),
                key: Some("release.asset_prefix".to_string()),
            });
        }

        Ok(())
    }
}

// Default value functions
fn default_index_url() -> String {
    DEFAULT_INDEX_URL.to_string()
}

fn default_asset_prefix() -> String {
    "chunker-cli-".to_string()
}

fn default_asset_suffix() -> String {
    ".jar".to_string()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("chunker-batch/{}", env!("CARGO_PKG_VERSION"))
}

fn default_true() -> bool {
    true
}

fn default_min_major_version() -> u32 {
    17
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_concurrent_jobs() -> usize {
    1
}

fn default_grace_period() -> Duration {
    Duration::from_secs(10)
}

fn default_max_captured_lines() -> usize {
    200
}

fn default_min_free_space() -> u64 {
    100 * 1024 * 1024 // 100 MB
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
