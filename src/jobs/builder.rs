//! Builds one job per world subdirectory of the input directory

use super::ConversionJob;
use super::world::{detect_edition, looks_like_world};
use crate::config::{BatchConfig, OutputNaming};
use crate::error::{Error, Result};
use crate::types::{Edition, TargetFormat};
use std::collections::HashSet;
use std::path::PathBuf;

/// What to convert and with which tools
#[derive(Clone, Debug)]
pub struct BuildRequest {
    /// Directory whose immediate subdirectories are worlds
    pub input_dir: PathBuf,
    /// Root of the converted worlds
    pub output_dir: PathBuf,
    /// Edition of the input worlds
    pub source_edition: Edition,
    /// Edition to convert to
    pub target_edition: Edition,
    /// Format identifier passed to the converter
    pub target_format: TargetFormat,
    /// Java runtime to launch
    pub runtime_path: PathBuf,
    /// Converter archive
    pub artifact_path: PathBuf,
}

/// Options controlling which subdirectories become jobs and where output goes
#[derive(Clone, Debug, Default)]
pub struct BuildOptions {
    /// Output directory naming scheme
    pub output_naming: OutputNaming,
    /// Skip subdirectories that do not look like worlds
    pub require_world_markers: bool,
}

impl From<&BatchConfig> for BuildOptions {
    fn from(config: &BatchConfig) -> Self {
        Self {
            output_naming: config.output_naming,
            require_world_markers: config.require_world_markers,
        }
    }
}

/// Turns a [`BuildRequest`] into an ordered list of jobs
#[derive(Clone, Debug, Default)]
pub struct JobBuilder {
    options: BuildOptions,
}

impl JobBuilder {
    /// Create a builder
    pub fn new(options: BuildOptions) -> Self {
        Self { options }
    }

    /// One job per immediate subdirectory of `request.input_dir`
    ///
    /// Jobs are ordered by directory name so the same input always yields the
    /// same batch. Plain files are ignored, and so are directories without world
    /// markers when `require_world_markers` is set.
    ///
    /// # Errors
    ///
    /// - [`Error::Disk`] if the input directory cannot be read
    /// - [`Error::EmptyInput`] if no world subdirectory is found
    pub async fn build(&self, request: &BuildRequest) -> Result<Vec<ConversionJob>> {
        let input = &request.input_dir;
        let mut entries = tokio::fs::read_dir(input)
            .await
            .map_err(|e| Error::disk(input, e))?;

        let mut worlds = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| Error::disk(input, e))? {
            let path = entry.path();

            // Follows symlinks; broken links are skipped like files
            let is_dir = tokio::fs::metadata(&path)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);
            if !is_dir {
                continue;
            }

            if self.options.require_world_markers && !looks_like_world(&path) {
                tracing::debug!(path = %path.display(), "skipping directory without world markers");
                continue;
            }

            worlds.push(path);
        }

        if worlds.is_empty() {
            return Err(Error::EmptyInput {
                path: input.clone(),
            });
        }

        worlds.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        if let Some(format_edition) = request.target_format.edition()
            && format_edition != request.target_edition
        {
            tracing::warn!(
                format = %request.target_format,
                target_edition = %request.target_edition,
                "target format belongs to a different edition than the target"
            );
        }

        let jobs: Vec<ConversionJob> = worlds
            .into_iter()
            .map(|world_path| {
                if let Some(detected) = detect_edition(&world_path)
                    && detected != request.source_edition
                {
                    tracing::warn!(
                        world = %world_path.display(),
                        detected = %detected,
                        expected = %request.source_edition,
                        "world layout does not match the source edition"
                    );
                }

                let output_path = self.output_path(request, &world_path);
                ConversionJob {
                    world_path,
                    output_path,
                    source_edition: request.source_edition,
                    target_edition: request.target_edition,
                    target_format: request.target_format.clone(),
                    runtime_path: request.runtime_path.clone(),
                    tool_artifact_path: request.artifact_path.clone(),
                }
            })
            .collect();

        tracing::info!(
            input = %input.display(),
            jobs = jobs.len(),
            format = %request.target_format,
            "built conversion jobs"
        );

        Ok(jobs)
    }

    fn output_path(&self, request: &BuildRequest, world_path: &std::path::Path) -> PathBuf {
        let name = world_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match self.options.output_naming {
            OutputNaming::WorldName => request.output_dir.join(name),
            OutputNaming::WorldNameWithFormat => request.output_dir.join(format!(
                "{}_{}",
                name,
                request.target_format.as_str().to_ascii_lowercase()
            )),
        }
    }
}

/// Keep only the jobs for the named worlds, preserving order
pub fn retain_worlds(jobs: Vec<ConversionJob>, worlds: &[String]) -> Vec<ConversionJob> {
    let wanted: HashSet<&str> = worlds.iter().map(String::as_str).collect();
    jobs.into_iter()
        .filter(|job| wanted.contains(job.world_name().as_str()))
        .collect()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn request(input: &Path, output: &Path, format: &str) -> BuildRequest {
        BuildRequest {
            input_dir: input.to_path_buf(),
            output_dir: output.to_path_buf(),
            source_edition: Edition::Java,
            target_edition: Edition::Bedrock,
            target_format: TargetFormat::parse(format),
            runtime_path: PathBuf::from("java"),
            artifact_path: PathBuf::from("chunker-cli-1.7.0.jar"),
        }
    }

    #[tokio::test]
    async fn one_job_per_subdirectory_in_name_order() {
        let input = TempDir::new().unwrap();
        for name in ["world2", "world1"] {
            std::fs::create_dir(input.path().join(name)).unwrap();
        }
        let output = input.path().join("out");

        let jobs = JobBuilder::default()
            .build(&request(input.path(), &output, "BEDROCK_1_21_70"))
            .await
            .unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].world_path, input.path().join("world1"));
        assert_eq!(jobs[0].output_path, output.join("world1"));
        assert_eq!(jobs[1].world_path, input.path().join("world2"));
        assert_eq!(jobs[1].output_path, output.join("world2"));
        for job in &jobs {
            assert_eq!(job.target_format.as_str(), "BEDROCK_1_21_70");
            assert_eq!(job.target_edition, Edition::Bedrock);
        }
    }

    #[tokio::test]
    async fn invocations_differ_only_in_world_and_output() {
        let input = TempDir::new().unwrap();
        std::fs::create_dir(input.path().join("world1")).unwrap();
        std::fs::create_dir(input.path().join("world2")).unwrap();

        let jobs = JobBuilder::default()
            .build(&request(input.path(), Path::new("out"), "BEDROCK_1_21_70"))
            .await
            .unwrap();

        let a = jobs[0].invocation();
        let b = jobs[1].invocation();
        assert_eq!(a.program, b.program);
        for (i, (x, y)) in a.args.iter().zip(&b.args).enumerate() {
            // -i <world> and -o <output> are at positions 3 and 5
            if i == 3 || i == 5 {
                assert_ne!(x, y);
            } else {
                assert_eq!(x, y);
            }
        }
    }

    #[tokio::test]
    async fn files_are_ignored() {
        let input = TempDir::new().unwrap();
        std::fs::create_dir(input.path().join("world1")).unwrap();
        std::fs::write(input.path().join("readme.txt"), b"not a world").unwrap();

        let jobs = JobBuilder::default()
            .build(&request(input.path(), Path::new("out"), "JAVA_1_20_5"))
            .await
            .unwrap();

        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].world_name(), "world1");
    }

    #[tokio::test]
    async fn no_subdirectories_is_empty_input() {
        let input = TempDir::new().unwrap();
        std::fs::write(input.path().join("level.dat"), b"").unwrap();

        let result = JobBuilder::default()
            .build(&request(input.path(), Path::new("out"), "BEDROCK_1_21_70"))
            .await;

        match result {
            Err(Error::EmptyInput { path }) => assert_eq!(path, input.path()),
            other => panic!("expected EmptyInput, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_input_directory_is_a_disk_error() {
        let input = TempDir::new().unwrap();
        let missing = input.path().join("nope");

        let result = JobBuilder::default()
            .build(&request(&missing, Path::new("out"), "BEDROCK_1_21_70"))
            .await;

        assert!(matches!(result, Err(Error::Disk { .. })));
    }

    #[tokio::test]
    async fn world_markers_filter_when_required() {
        let input = TempDir::new().unwrap();
        let real = input.path().join("survival");
        std::fs::create_dir(&real).unwrap();
        std::fs::write(real.join("level.dat"), b"").unwrap();
        std::fs::create_dir(input.path().join("screenshots")).unwrap();

        let builder = JobBuilder::new(BuildOptions {
            require_world_markers: true,
            ..Default::default()
        });
        let jobs = builder
            .build(&request(input.path(), Path::new("out"), "BEDROCK_1_21_70"))
            .await
            .unwrap();

        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].world_name(), "survival");

        // Without the filter both directories are jobs
        let all = JobBuilder::default()
            .build(&request(input.path(), Path::new("out"), "BEDROCK_1_21_70"))
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn format_suffix_naming() {
        let input = TempDir::new().unwrap();
        std::fs::create_dir(input.path().join("world1")).unwrap();

        let builder = JobBuilder::new(BuildOptions {
            output_naming: OutputNaming::WorldNameWithFormat,
            ..Default::default()
        });
        let jobs = builder
            .build(&request(input.path(), Path::new("out"), "BEDROCK_1_21_70"))
            .await
            .unwrap();

        assert_eq!(
            jobs[0].output_path,
            Path::new("out").join("world1_bedrock_1_21_70")
        );
    }

    #[tokio::test]
    async fn building_twice_yields_the_same_jobs() {
        let input = TempDir::new().unwrap();
        for name in ["c", "a", "b"] {
            std::fs::create_dir(input.path().join(name)).unwrap();
        }
        let req = request(input.path(), Path::new("out"), "JAVA_1_21_5");

        let first = JobBuilder::default().build(&req).await.unwrap();
        let second = JobBuilder::default().build(&req).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn retain_worlds_keeps_order() {
        let input = TempDir::new().unwrap();
        for name in ["a", "b", "c"] {
            std::fs::create_dir(input.path().join(name)).unwrap();
        }
        let jobs = JobBuilder::default()
            .build(&request(input.path(), Path::new("out"), "JAVA_1_21_5"))
            .await
            .unwrap();

        let kept = retain_worlds(jobs, &["c".to_string(), "a".to_string()]);
        let names: Vec<String> = kept.iter().map(|j| j.world_name()).collect();
        assert_eq!(names, vec!["a", "c"]);
    }
}
