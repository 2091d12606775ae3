#![forbid(unsafe_code)]

//! Command-line entry point: loads the job configuration, probes the
//! external tools and downloads the selected part of a playlist.
//!
//! Fatal problems (bad configuration, missing tools, an unlistable playlist)
//! end the process with a non-zero status. Items that fail on their own are
//! logged and counted but never change the exit status.

use anyhow::{Context, Result};
use clap::Parser;
use playlist_dl::config::{ConfigOverrides, DEFAULT_CONFIG_PATH, DownloadMode, load_job_config};
use playlist_dl::error::RunError;
use playlist_dl::progress::ProgressWriter;
use playlist_dl::report::{DISCLAIMER, Reporter, RunLog, init_tracing};
use playlist_dl::runner::{CommandRunner, ProcessRunner, probe_program};
use playlist_dl::{JobConfig, Orchestrator, RunSummary};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(
    name = "download_playlist",
    version,
    about = "Download every item of a playlist with yt-dlp and ffmpeg"
)]
struct Args {
    /// JSON (or .toml) job configuration.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Output directory; overrides `output`.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Number of items processed at once; overrides `parallel`.
    #[arg(long)]
    parallel: Option<i64>,
    /// First playlist position to download (1-based).
    #[arg(long)]
    start: Option<i64>,
    /// Last playlist position to download; 0 means the end of the playlist.
    #[arg(long)]
    end: Option<i64>,
    /// video, audio or both; overrides `mode`.
    #[arg(long)]
    mode: Option<String>,
    /// Fetch attempts per stream; overrides `retries`.
    #[arg(long)]
    retries: Option<i64>,
    /// Write `{"progress", "message"}` JSON updates to this file.
    #[arg(long)]
    progress_file: Option<PathBuf>,
    /// Write the run summary as JSON to this file.
    #[arg(long)]
    summary: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            output: self.output.clone(),
            parallel: self.parallel,
            mode: self.mode.clone(),
            retries: self.retries,
            start: self.start,
            end: self.end,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    let config = match load_job_config(&args.config, args.overrides()) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(config = %args.config.display(), "configuration rejected");
            eprintln!("Error: {err}");
            return ExitCode::FAILURE;
        }
    };
    let log = match open_run_log(&config) {
        Ok(log) => Arc::new(log),
        Err(err) => {
            eprintln!("Error: {err:#}");
            return ExitCode::FAILURE;
        }
    };
    log.info(DISCLAIMER);

    let runner = Arc::new(ProcessRunner::with_timeout(config.tools.command_timeout));
    let code = match run(&args, config, runner, log.clone()).await {
        Ok(summary) => {
            print_summary(&summary, log.path());
            ExitCode::SUCCESS
        }
        Err(err) => {
            log.error(&format!("{err:#}"));
            ExitCode::FAILURE
        }
    };
    log.finish();
    code
}

/// Creates the output/temp directories and opens `<output>/download.log`.
fn open_run_log(config: &JobConfig) -> Result<RunLog> {
    config.layout.prepare()?;
    RunLog::open(&config.layout.log_file, true)
        .with_context(|| format!("opening {}", config.layout.log_file.display()))
}

async fn run(
    args: &Args,
    config: JobConfig,
    runner: Arc<dyn CommandRunner>,
    log: Arc<RunLog>,
) -> Result<RunSummary> {
    ensure_tools_available(runner.as_ref(), &config).await?;

    log.info(&format!(
        "Starting {} download of {} into {}",
        config.mode,
        config.playlist_url,
        config.layout.output_dir.display()
    ));

    let progress = args.progress_file.clone().map(ProgressWriter::new);
    let summary = Orchestrator::new(config, runner, log)
        .with_progress(progress)
        .run()
        .await?;

    if let Some(path) = &args.summary {
        write_summary(path, &summary)?;
    }
    Ok(summary)
}

/// The fetcher is always needed; the muxer only when streams get merged.
async fn ensure_tools_available(runner: &dyn CommandRunner, config: &JobConfig) -> Result<()> {
    let tools = &config.tools;
    let mut probes = vec![(tools.fetcher.as_str(), "--version")];
    if config.mode == DownloadMode::Both {
        probes.push((tools.muxer.as_str(), "-version"));
    }
    for (program, probe_arg) in probes {
        probe_program(runner, program, probe_arg)
            .await
            .map_err(|message| RunError::ToolUnavailable {
                program: program.to_string(),
                message,
            })?;
    }
    Ok(())
}

fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(summary).context("serializing run summary")?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

fn print_summary(summary: &RunSummary, log_path: &Path) {
    println!();
    println!("===================================");
    println!("Playlist download finished");
    println!("===================================");
    println!(
        "Selected: {} of {} (items {} to {})",
        summary.selected(),
        summary.playlist_total,
        summary.start,
        summary.end
    );
    println!("Succeeded: {}", summary.succeeded);
    println!("Failed: {}", summary.failed);
    for item in summary.items.iter().filter(|item| !item.is_success()) {
        let reason = item
            .failure
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        println!("  - #{} {}: {reason}", item.index, item.url);
    }
    println!("Log: {}", log_path.display());
}
