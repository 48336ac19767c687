//! Conversion job descriptions
//!
//! A [`ConversionJob`] is everything needed to convert one world: where it is,
//! where the result goes, which format to produce, and which runtime and
//! converter artifact to launch. Jobs are created by [`JobBuilder`] from a
//! [`BuildRequest`] at batch start and never change afterwards.
//!
//! The converter invocation is derived from the job alone:
//!
//! ```text
//! <runtime> -jar <artifact> -i <world> -o <output> -f <format>
//! ```

mod builder;
mod world;

pub use builder::{BuildOptions, BuildRequest, JobBuilder, retain_worlds};
pub use world::{detect_edition, looks_like_world};

use crate::types::{Edition, TargetFormat};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::PathBuf;

/// One world to convert
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionJob {
    /// World directory (a direct child of the batch input directory)
    pub world_path: PathBuf,
    /// Directory the converted world is written to
    pub output_path: PathBuf,
    /// Edition of the input world
    pub source_edition: Edition,
    /// Edition to convert to
    pub target_edition: Edition,
    /// Format identifier passed to the converter
    pub target_format: TargetFormat,
    /// Java runtime to launch
    pub runtime_path: PathBuf,
    /// Converter archive
    pub tool_artifact_path: PathBuf,
}

impl ConversionJob {
    /// Directory name of the world
    pub fn world_name(&self) -> String {
        self.world_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.world_path.display().to_string())
    }

    /// The converter command line for this job
    pub fn invocation(&self) -> Invocation {
        Invocation {
            program: self.runtime_path.clone(),
            args: vec![
                OsString::from("-jar"),
                self.tool_artifact_path.clone().into_os_string(),
                OsString::from("-i"),
                self.world_path.clone().into_os_string(),
                OsString::from("-o"),
                self.output_path.clone().into_os_string(),
                OsString::from("-f"),
                OsString::from(self.target_format.as_str()),
            ],
        }
    }
}

/// A program and its arguments
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    /// Executable to launch
    pub program: PathBuf,
    /// Arguments, in order
    pub args: Vec<OsString>,
}

impl Invocation {
    /// Build a process command for this invocation (stdio left to the caller)
    pub fn command(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl std::fmt::Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            if arg.contains(' ') {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(world: &str) -> ConversionJob {
        ConversionJob {
            world_path: PathBuf::from("saves").join(world),
            output_path: PathBuf::from("output").join(world),
            source_edition: Edition::Java,
            target_edition: Edition::Bedrock,
            target_format: TargetFormat::parse("BEDROCK_1_21_70"),
            runtime_path: PathBuf::from("/usr/bin/java"),
            tool_artifact_path: PathBuf::from("chunker-cli-1.7.0.jar"),
        }
    }

    #[test]
    fn invocation_has_fixed_argument_order() {
        let invocation = job("world1").invocation();

        assert_eq!(invocation.program, PathBuf::from("/usr/bin/java"));
        let args: Vec<String> = invocation
            .args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-jar",
                "chunker-cli-1.7.0.jar",
                "-i",
                PathBuf::from("saves").join("world1").to_str().unwrap_or_default(),
                "-o",
                PathBuf::from("output").join("world1").to_str().unwrap_or_default(),
                "-f",
                "BEDROCK_1_21_70",
            ]
        );
    }

    #[test]
    fn invocation_is_a_pure_function_of_the_job() {
        let a = job("world1");
        let b = a.clone();

        assert_eq!(a.invocation(), b.invocation());
        assert_eq!(a.invocation(), a.invocation());
    }

    #[test]
    fn custom_format_is_passed_verbatim() {
        let mut custom = job("world1");
        custom.target_format = TargetFormat::parse("BEDROCK_1_99_experimental");

        let invocation = custom.invocation();
        assert_eq!(
            invocation.args.last().map(|a| a.to_string_lossy().into_owned()),
            Some("BEDROCK_1_99_experimental".to_string())
        );
    }

    #[test]
    fn job_with_custom_format_serializes() {
        let mut custom = job("world1");
        custom.target_format = TargetFormat::parse("BEDROCK_1_99_experimental");

        let json = serde_json::to_string(&custom).unwrap_or_default();
        assert!(json.contains("BEDROCK_1_99_experimental"), "{json}");
        let back: ConversionJob = serde_json::from_str(&json).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(back, custom);
    }

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let mut spaced = job("My World");
        spaced.runtime_path = PathBuf::from("java");

        let rendered = spaced.invocation().to_string();
        assert!(rendered.starts_with("java -jar chunker-cli-1.7.0.jar -i \""));
        assert!(rendered.contains("My World\""));
        assert!(rendered.ends_with("-f BEDROCK_1_21_70"));
    }

    #[test]
    fn world_name_is_last_component() {
        assert_eq!(job("world2").world_name(), "world2");
    }
}
