#![forbid(unsafe_code)]

//! Per-item pipeline:
//!
//! ```text
//! Start -> TitleResolved -> StreamsFetched -> Assembled
//!    \            \                 \
//!     `------------`-----------------`--> Failed(reason)
//! ```
//!
//! Each item owns its temp files and final path (both keyed by its claimed
//! stem). A failure only ends that item; the orchestrator keeps going.

use crate::assemble::{locate_stream, merge_streams, relocate, remove_inputs};
use crate::config::{DownloadMode, JobConfig};
use crate::fetch::{FetchFailure, FetchRequest, fetch_stream};
use crate::layout::StreamKind;
use crate::report::Reporter;
use crate::runner::CommandRunner;
use crate::sanitize::{TitleClaims, sanitize_title};
use crate::title::resolve_title;
use serde::{Serialize, Serializer};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStage {
    Start,
    TitleResolved,
    StreamsFetched,
    Assembled,
    Failed,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ItemFailure {
    #[error("could not retrieve title")]
    TitleUnavailable,

    #[error(transparent)]
    StreamFetchFailed(#[from] FetchFailure),

    #[error("missing downloaded {0} file")]
    FilesMissing(StreamKind),

    #[error("assembly failed: {0}")]
    AssemblyFailed(String),

    #[error("item job aborted: {0}")]
    Aborted(String),
}

/// Everything an item job needs. Cheap to clone; shared read-only.
#[derive(Clone)]
pub struct ItemContext {
    pub config: Arc<JobConfig>,
    pub runner: Arc<dyn CommandRunner>,
    pub reporter: Arc<dyn Reporter>,
    pub claims: Arc<TitleClaims>,
}

/// Transient state of one item while it moves through the pipeline.
#[derive(Debug)]
struct ItemJob {
    index: usize,
    total: usize,
    url: String,
    title: Option<String>,
    stem: Option<String>,
    video: Option<PathBuf>,
    audio: Option<PathBuf>,
    output: Option<PathBuf>,
    stage: ItemStage,
    cleanup_warnings: Vec<String>,
}

impl ItemJob {
    fn new(index: usize, total: usize, url: &str) -> Self {
        Self {
            index,
            total,
            url: url.to_string(),
            title: None,
            stem: None,
            video: None,
            audio: None,
            output: None,
            stage: ItemStage::Start,
            cleanup_warnings: Vec::new(),
        }
    }

    fn advance(&mut self, next: ItemStage) {
        debug_assert!(next > self.stage, "{:?} -> {:?}", self.stage, next);
        self.stage = next;
    }

    fn label(&self) -> String {
        match &self.stem {
            Some(stem) => format!("'{stem}'"),
            None => self.url.clone(),
        }
    }

    fn stream_slot(&mut self, kind: StreamKind) -> &mut Option<PathBuf> {
        match kind {
            StreamKind::Video => &mut self.video,
            StreamKind::Audio => &mut self.audio,
        }
    }

    fn into_report(self, failure: Option<ItemFailure>) -> ItemReport {
        ItemReport {
            index: self.index,
            url: self.url,
            title: self.title,
            stem: self.stem,
            stage: self.stage,
            output: if failure.is_none() { self.output } else { None },
            failure,
            cleanup_warnings: self.cleanup_warnings,
        }
    }
}

/// Terminal outcome of one item.
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub index: usize,
    pub url: String,
    pub title: Option<String>,
    pub stem: Option<String>,
    pub stage: ItemStage,
    pub output: Option<PathBuf>,
    #[serde(serialize_with = "serialize_failure")]
    pub failure: Option<ItemFailure>,
    pub cleanup_warnings: Vec<String>,
}

impl ItemReport {
    pub fn is_success(&self) -> bool {
        self.stage == ItemStage::Assembled
    }

    /// Report for an item whose job never returned normally.
    pub fn aborted(index: usize, url: &str, reason: String) -> Self {
        ItemJob::new(index, 0, url).into_failed(ItemFailure::Aborted(reason))
    }
}

impl ItemJob {
    fn into_failed(mut self, failure: ItemFailure) -> ItemReport {
        self.stage = ItemStage::Failed;
        self.into_report(Some(failure))
    }
}

fn serialize_failure<S: Serializer>(
    failure: &Option<ItemFailure>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match failure {
        Some(failure) => serializer.serialize_some(&failure.to_string()),
        None => serializer.serialize_none(),
    }
}

fn streams_for(mode: DownloadMode) -> &'static [StreamKind] {
    match mode {
        DownloadMode::Both => &[StreamKind::Video, StreamKind::Audio],
        DownloadMode::Video => &[StreamKind::Video],
        DownloadMode::Audio => &[StreamKind::Audio],
    }
}

/// Runs one item to a terminal state. Never fails; failures are part of the
/// returned report.
pub async fn run_item(ctx: &ItemContext, index: usize, total: usize, url: &str) -> ItemReport {
    let mut job = ItemJob::new(index, total, url);
    ctx.reporter
        .info(&format!("Processing video {} of {}...", job.index, job.total));

    match process(ctx, &mut job).await {
        Ok(()) => {
            job.advance(ItemStage::Assembled);
            job.into_report(None)
        }
        Err(failure) => {
            ctx.reporter.error(&format!(
                "Skipping video {} ({}): {failure}",
                job.index,
                job.label()
            ));
            job.into_failed(failure)
        }
    }
}

async fn process(ctx: &ItemContext, job: &mut ItemJob) -> Result<(), ItemFailure> {
    let config = ctx.config.as_ref();
    let runner = ctx.runner.as_ref();
    let reporter = ctx.reporter.as_ref();

    let title = resolve_title(runner, &config.tools.fetcher, &job.url)
        .await
        .ok_or(ItemFailure::TitleUnavailable)?;
    let mut stem = sanitize_title(&title);
    if stem.trim().is_empty() {
        stem = format!("item-{}", job.index);
    }
    let stem = ctx.claims.claim(&stem);
    job.title = Some(title);
    job.stem = Some(stem.clone());
    job.output = Some(config.layout.final_path(&stem, &config.output_format));
    job.advance(ItemStage::TitleResolved);

    let kinds = streams_for(config.mode);
    let mut reported = Vec::with_capacity(kinds.len());
    for &kind in kinds {
        let template = config.layout.temp_template(&stem, kind);
        let request = FetchRequest {
            item_url: &job.url,
            kind,
            template: &template,
            max_retries: config.retries,
        };
        let fetched = fetch_stream(runner, &config.tools.fetcher, &request, reporter).await?;
        reported.push((kind, fetched.reported_path));
    }
    for (kind, reported_path) in reported {
        let path = reported_path
            .filter(|path| path.is_file())
            .or_else(|| locate_stream(&config.layout.temp_dir, &stem, kind))
            .ok_or(ItemFailure::FilesMissing(kind))?;
        *job.stream_slot(kind) = Some(path);
    }
    job.advance(ItemStage::StreamsFetched);

    let output = config.layout.final_path(&stem, &config.output_format);
    match (job.video.clone(), job.audio.clone()) {
        (Some(video), Some(audio)) => {
            reporter.info(&format!(
                "Merging video and audio for '{stem}' into {}...",
                output.display()
            ));
            merge_streams(
                runner,
                &config.tools.muxer,
                &config.tools.audio_codec,
                &video,
                &audio,
                &output,
            )
            .await
            .map_err(ItemFailure::AssemblyFailed)?;
            reporter.info(&format!("Successfully merged and saved: {}", output.display()));

            for warning in remove_inputs(&[&video, &audio]) {
                reporter.warn(&format!(
                    "Error cleaning up temporary files for '{stem}': {warning}"
                ));
                job.cleanup_warnings.push(warning);
            }
        }
        (Some(single), None) | (None, Some(single)) => {
            let kind = if job.video.is_some() {
                StreamKind::Video
            } else {
                StreamKind::Audio
            };
            relocate(&single, &output).await.map_err(|err| {
                ItemFailure::AssemblyFailed(format!("moving {kind} file for '{stem}': {err}"))
            })?;
            let noun = match kind {
                StreamKind::Video => "Video",
                StreamKind::Audio => "Audio",
            };
            reporter.info(&format!("{noun} saved: {}", output.display()));
        }
        (None, None) => return Err(ItemFailure::FilesMissing(kinds[0])),
    }

    Ok(())
}
