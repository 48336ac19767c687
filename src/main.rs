//! chunker-batch - convert a directory of Minecraft worlds with Chunker

use chunker_batch::config::OutputNaming;
use chunker_batch::{
    BatchEvent, BatchSummary, ChunkerLauncher, Config, ConvertRequest, Edition, Event, JobStatus,
    OutputStream, TargetFormat, formats,
};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Batch converter for Minecraft worlds using Chunker", long_about = None)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(short, long, global = true, env = "CHUNKER_BATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for downloaded converter versions
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List published converter versions
    Versions,

    /// Download a converter version into the cache
    Download {
        /// Version tag, or "latest"
        #[arg(default_value = "latest")]
        tag: String,
    },

    /// List known target format identifiers
    Formats {
        /// Only show one edition
        #[arg(long)]
        edition: Option<Edition>,
    },

    /// Check that a Java runtime can run the converter
    CheckRuntime {
        /// Java executable (located automatically if omitted)
        path: Option<PathBuf>,
    },

    /// Convert every world in a directory
    Convert(ConvertArgs),
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Directory containing one subdirectory per world
    #[arg(short, long)]
    input: PathBuf,

    /// Directory receiving the converted worlds
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// Target format: identifier (BEDROCK_1_21_70) or game version (1.21.70); newest if omitted
    #[arg(short, long, conflicts_with = "custom_format")]
    format: Option<String>,

    /// Format identifier passed to the converter without checking the catalog
    #[arg(long)]
    custom_format: Option<String>,

    /// Edition to convert to
    #[arg(long, default_value = "bedrock")]
    target_edition: Edition,

    /// Edition of the input worlds
    #[arg(long, default_value = "java")]
    source_edition: Edition,

    /// Java executable to use
    #[arg(long)]
    runtime: Option<PathBuf>,

    /// Converter jar to use
    #[arg(long, conflicts_with = "tool_version")]
    artifact: Option<PathBuf>,

    /// Converter version to use (downloaded if needed), or "latest"
    #[arg(long = "version", value_name = "TAG")]
    tool_version: Option<String>,

    /// Number of worlds converted at once
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Run the failed worlds once more after the batch
    #[arg(long)]
    retry_failed: bool,

    /// Name outputs <world>_<format> instead of <world>
    #[arg(long)]
    format_suffix: bool,

    /// Skip subdirectories without level.dat, session.lock or db/
    #[arg(long)]
    worlds_only: bool,

    /// Print converter output
    #[arg(long)]
    show_output: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            status(&format!("Error [{}]: {}", e.error_code(), e));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> chunker_batch::Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(cache_dir) = cli.cache_dir {
        config.release.cache_dir = cache_dir;
    }
    if config.release.search_dirs.is_empty()
        && let Ok(cwd) = std::env::current_dir()
    {
        config.release.search_dirs.push(cwd);
    }

    match cli.command {
        Command::Formats { edition } => {
            print_formats(edition);
            Ok(ExitCode::SUCCESS)
        }
        Command::Versions => {
            let launcher = ChunkerLauncher::new(config).await?;
            print_versions(&launcher).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Download { tag } => {
            let launcher = ChunkerLauncher::new(config).await?;
            let printer = spawn_event_printer(&launcher);
            let path = launcher.download(&tag).await?;
            printer.abort();
            status(&format!("Converter ready at {}", path.display()));
            Ok(ExitCode::SUCCESS)
        }
        Command::CheckRuntime { path } => {
            let launcher = ChunkerLauncher::new(config).await?;
            check_runtime(&launcher, path).await
        }
        Command::Convert(args) => {
            if let Some(jobs) = args.jobs {
                config.batch.max_concurrent_jobs = jobs;
            }
            if args.format_suffix {
                config.batch.output_naming = OutputNaming::WorldNameWithFormat;
            }
            if args.worlds_only {
                config.batch.require_world_markers = true;
            }
            let launcher = ChunkerLauncher::new(config).await?;
            convert(&launcher, args).await
        }
    }
}

fn print_formats(edition: Option<Edition>) {
    let editions: Vec<Edition> = match edition {
        Some(edition) => vec![edition],
        None => Edition::ALL.to_vec(),
    };

    for edition in editions {
        println!("{}:", edition);
        let latest = formats::latest(edition);
        for id in formats::formats(edition).iter().rev() {
            if *id == latest {
                println!("  {} (latest)", id);
            } else {
                println!("  {}", id);
            }
        }
    }
}

async fn print_versions(launcher: &ChunkerLauncher) -> chunker_batch::Result<()> {
    let versions = launcher.list_versions().await?;
    if versions.is_empty() {
        status("No converter releases found");
        return Ok(());
    }

    for artifact in versions {
        let published = artifact
            .published_at
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "unknown date".to_string());
        let size = artifact
            .size
            .map(|s| format!("{:.1} MB", s as f64 / 1_048_576.0))
            .unwrap_or_default();
        let cached = if artifact.local_path.is_some() {
            " [cached]"
        } else {
            ""
        };
        println!(
            "{:<12} {:<28} {:<12} {}{}",
            artifact.version_tag, artifact.jar_name, published, size, cached
        );
    }
    Ok(())
}

async fn check_runtime(
    launcher: &ChunkerLauncher,
    path: Option<PathBuf>,
) -> chunker_batch::Result<ExitCode> {
    let candidate = match path {
        Some(path) => path,
        None => match chunker_batch::runtime::RuntimeLocator::new(launcher.config().runtime.clone())
            .locate()
        {
            Some(path) => path,
            None => {
                status("No Java runtime found (set JAVA_HOME or pass a path)");
                return Ok(ExitCode::FAILURE);
            }
        },
    };

    let info = launcher.validate_runtime(&candidate).await?;
    status(&format!(
        "Java {} at {} is compatible with Chunker",
        info.version,
        info.path.display()
    ));
    Ok(ExitCode::SUCCESS)
}

async fn convert(launcher: &ChunkerLauncher, args: ConvertArgs) -> chunker_batch::Result<ExitCode> {
    let printer = spawn_event_printer(launcher);

    let target_format = select_format(&args)?;
    let artifact_path = select_artifact(launcher, &args).await?;

    let request = ConvertRequest {
        input_dir: args.input.clone(),
        output_dir: args.output.clone(),
        source_edition: args.source_edition,
        target_edition: args.target_edition,
        target_format,
        runtime_path: args.runtime.clone(),
        artifact_path,
    };

    status(&format!(
        "Converting worlds in {} to {}",
        request.input_dir.display(),
        request.target_format
    ));
    let batch = launcher.prepare_batch(&request).await?;
    let mut summary = run_batch(launcher, batch, args.show_output).await?;

    if args.retry_failed && summary.failed > 0 && summary.cancelled == 0 {
        status(&format!("Retrying {} failed world(s)", summary.failed));
        let retry = launcher.retry_failed(&request, &summary).await?;
        summary = run_batch(launcher, retry, args.show_output).await?;
    }

    printer.abort();

    if summary.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        for world in summary.failed_worlds() {
            status(&format!("Failed: {}", world));
        }
        Ok(ExitCode::FAILURE)
    }
}

async fn run_batch(
    launcher: &ChunkerLauncher,
    batch: std::sync::Arc<chunker_batch::BatchRun>,
    show_output: bool,
) -> chunker_batch::Result<BatchSummary> {
    let mut handle = launcher.start_batch(batch);
    let signal_task = chunker_batch::cancel_on_shutdown_signal(handle.cancellation_token());

    while let Some(event) = handle.next_event().await {
        match event {
            BatchEvent::Status {
                world,
                status: job_status,
                message,
                ..
            } => match job_status {
                JobStatus::Pending => {}
                JobStatus::Running => status(&format!("Processing world: {}", world)),
                JobStatus::Succeeded => status(&format!("Converted {}", world)),
                JobStatus::Failed => status(&format!("Failed {}: {}", world, message)),
                JobStatus::Cancelled => status(&format!("Cancelled {}", world)),
            },
            BatchEvent::Output { stream, line, .. } if show_output => match stream {
                OutputStream::Stdout => println!("    {}", line),
                OutputStream::Stderr => eprintln!("    {}", line),
            },
            BatchEvent::Output { .. } => {}
        }
    }

    let summary = handle.wait().await?;
    signal_task.abort();

    status(&format!(
        "Conversion finished: {} succeeded, {} failed, {} cancelled",
        summary.succeeded, summary.failed, summary.cancelled
    ));
    Ok(summary)
}

fn select_format(args: &ConvertArgs) -> chunker_batch::Result<TargetFormat> {
    if let Some(custom) = &args.custom_format {
        return Ok(TargetFormat::Custom(custom.clone()));
    }

    let Some(wanted) = &args.format else {
        return Ok(TargetFormat::parse(formats::latest(args.target_edition)));
    };

    let format = TargetFormat::parse(wanted);
    if matches!(format, TargetFormat::Known { .. }) {
        return Ok(format);
    }

    match formats::lookup(args.target_edition, wanted) {
        Some(id) => Ok(TargetFormat::parse(id)),
        None => Err(chunker_batch::Error::Config {
            message: format!(
                "unknown {} format '{}' (see `chunker-batch formats`, or use --custom-format)",
                args.target_edition, wanted
            ),
            key: Some("format".to_string()),
        }),
    }
}

/// Explicit jar, explicit version, newest cached jar, or the latest release
async fn select_artifact(
    launcher: &ChunkerLauncher,
    args: &ConvertArgs,
) -> chunker_batch::Result<PathBuf> {
    if let Some(path) = &args.artifact {
        return Ok(path.clone());
    }
    if let Some(tag) = &args.tool_version {
        return launcher.download(tag).await;
    }

    let cached = launcher.cached_artifacts().await?;
    if let Some(newest) = cached
        .into_iter()
        .filter(|a| a.local_path.is_some())
        .max_by_key(|a| version_key(&a.version_tag))
        && let Some(path) = newest.local_path
    {
        status(&format!("Using {}", newest.jar_name));
        return Ok(path);
    }

    status("No converter found locally, downloading the latest release");
    launcher.download(chunker_batch::launcher::LATEST).await
}

/// Numeric components of a version tag, for ordering (`v1.10.0` > `1.9.2`)
fn version_key(tag: &str) -> Vec<u64> {
    tag.split(|c: char| !c.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .filter_map(|part| part.parse().ok())
        .collect()
}

fn spawn_event_printer(launcher: &ChunkerLauncher) -> tokio::task::JoinHandle<()> {
    let mut events = launcher.subscribe();
    tokio::spawn(async move {
        let mut last_decile = None;
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            };

            match event {
                Event::DownloadStarted { tag, total_bytes } => {
                    last_decile = None;
                    let size = total_bytes
                        .map(|b| format!(" ({:.1} MB)", b as f64 / 1_048_576.0))
                        .unwrap_or_default();
                    status(&format!("Downloading converter {}{}", tag, size));
                }
                Event::DownloadProgress {
                    percent: Some(percent),
                    ..
                } => {
                    let decile = (percent / 10.0) as u32;
                    if last_decile != Some(decile) {
                        last_decile = Some(decile);
                        status(&format!("Downloaded {}%", decile * 10));
                    }
                }
                Event::DownloadComplete { tag, .. } => {
                    status(&format!("Downloaded converter {}", tag));
                }
                Event::DownloadFailed { tag, error } => {
                    status(&format!("Download of {} failed: {}", tag, error));
                }
                Event::ArtifactCached { tag, path } => {
                    status(&format!("Using cached converter {} ({})", tag, path.display()));
                }
                Event::RuntimeDetected { path, version } => {
                    status(&format!("Detected Java {} at {}", version, path.display()));
                }
                Event::RuntimeWarning { message } => {
                    status(&format!("Warning: {}", message));
                }
                _ => {}
            }
        }
    })
}

/// Print a `[HH:MM:SS] message` status line
fn status(message: &str) {
    println!("[{}] {}", chrono::Local::now().format("%H:%M:%S"), message);
}
