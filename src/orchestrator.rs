#![forbid(unsafe_code)]

//! Resolves the playlist, applies the selection range and drives the item
//! pipeline over it, either strictly in order or on a bounded worker pool.

use crate::config::JobConfig;
use crate::error::{Result, RunError};
use crate::pipeline::{ItemContext, ItemReport, run_item};
use crate::progress::{ProgressWriter, update_progress};
use crate::report::Reporter;
use crate::runner::CommandRunner;
use crate::sanitize::TitleClaims;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub playlist_url: String,
    pub playlist_total: usize,
    pub start: usize,
    pub end: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Sorted by position within the selection (`index` 1 is `start`).
    pub items: Vec<ItemReport>,
}

impl RunSummary {
    pub fn selected(&self) -> usize {
        self.items.len()
    }
}

pub fn playlist_args(playlist_url: &str) -> Vec<String> {
    vec![
        "--flat-playlist".to_string(),
        "--print".to_string(),
        "url".to_string(),
        playlist_url.to_string(),
    ]
}

/// Lists item URLs in playlist order. A failing command or an empty
/// playlist is fatal.
pub async fn list_playlist(
    runner: &dyn CommandRunner,
    fetcher: &str,
    playlist_url: &str,
) -> Result<Vec<String>> {
    let output = runner.run(fetcher, &playlist_args(playlist_url)).await;
    if !output.success {
        return Err(RunError::PlaylistExtraction(output.error_text()));
    }
    let urls: Vec<String> = output
        .stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect();
    if urls.is_empty() {
        return Err(RunError::EmptyPlaylist);
    }
    Ok(urls)
}

pub struct Orchestrator {
    config: Arc<JobConfig>,
    runner: Arc<dyn CommandRunner>,
    reporter: Arc<dyn Reporter>,
    progress: Option<ProgressWriter>,
}

impl Orchestrator {
    pub fn new(
        config: JobConfig,
        runner: Arc<dyn CommandRunner>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            runner,
            reporter,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressWriter>) -> Self {
        self.progress = progress;
        self
    }

    pub async fn run(&self) -> Result<RunSummary> {
        let started_at = Utc::now();
        let config = self.config.as_ref();

        let urls = list_playlist(
            self.runner.as_ref(),
            &config.tools.fetcher,
            &config.playlist_url,
        )
        .await?;
        let total = urls.len();
        let (start, end) = config.range.resolve(total)?;
        let selected: Vec<String> = urls[start - 1..end].to_vec();
        self.reporter.info(&format!(
            "Found {total} videos in the playlist. Downloading videos {start} to {end} ({} videos).",
            selected.len()
        ));
        update_progress(self.progress.as_ref(), 0, selected.len(), "Starting downloads");

        let ctx = ItemContext {
            config: self.config.clone(),
            runner: self.runner.clone(),
            reporter: self.reporter.clone(),
            claims: Arc::new(TitleClaims::new()),
        };

        let mut items = if config.parallel <= 1 {
            self.run_sequential(&ctx, selected).await
        } else {
            self.run_pool(&ctx, selected).await
        };
        items.sort_by_key(|item| item.index);

        let succeeded = items.iter().filter(|item| item.is_success()).count();
        let failed = items.len() - succeeded;
        self.reporter.info(&format!(
            "Finished: {succeeded} succeeded, {failed} failed out of {} selected videos.",
            items.len()
        ));
        update_progress(self.progress.as_ref(), items.len(), items.len(), "Download complete");

        Ok(RunSummary {
            playlist_url: config.playlist_url.clone(),
            playlist_total: total,
            start,
            end,
            succeeded,
            failed,
            started_at,
            finished_at: Utc::now(),
            items,
        })
    }

    async fn run_sequential(&self, ctx: &ItemContext, selected: Vec<String>) -> Vec<ItemReport> {
        let total = selected.len();
        let mut items = Vec::with_capacity(total);
        for (offset, url) in selected.into_iter().enumerate() {
            let report = guarded_item(ctx, offset + 1, total, url).await;
            items.push(report);
            self.completed(items.len(), total);
        }
        items
    }

    /// `parallel` workers pull jobs from a shared queue and send their
    /// reports back over a channel. Completion order is unspecified.
    async fn run_pool(&self, ctx: &ItemContext, selected: Vec<String>) -> Vec<ItemReport> {
        let total = selected.len();
        let queue: Arc<Mutex<VecDeque<(usize, String)>>> = Arc::new(Mutex::new(
            selected
                .into_iter()
                .enumerate()
                .map(|(offset, url)| (offset + 1, url))
                .collect(),
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let workers = self.config.parallel.min(total.max(1));

        for worker in 0..workers {
            let queue = queue.clone();
            let tx = tx.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                loop {
                    let next = queue.lock().pop_front();
                    let Some((index, url)) = next else {
                        break;
                    };
                    tracing::debug!(worker, index, "worker picked item");
                    let report = guarded_item(&ctx, index, total, url).await;
                    if tx.send(report).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        let mut items = Vec::with_capacity(total);
        while let Some(report) = rx.recv().await {
            items.push(report);
            self.completed(items.len(), total);
        }
        items
    }

    fn completed(&self, done: usize, total: usize) {
        let message = format!("Overall progress: {done}/{total} videos processed");
        self.reporter.info(&message);
        update_progress(self.progress.as_ref(), done, total, &message);
    }
}

/// Runs one item and turns a panic inside it into a failed report.
async fn guarded_item(ctx: &ItemContext, index: usize, total: usize, url: String) -> ItemReport {
    match AssertUnwindSafe(run_item(ctx, index, total, &url))
        .catch_unwind()
        .await
    {
        Ok(report) => report,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<String>()
                .cloned()
                .or_else(|| panic.downcast_ref::<&str>().map(|s| s.to_string()))
                .unwrap_or_else(|| "panic".to_string());
            ctx.reporter
                .error(&format!("Error processing video {index} ({url}): {reason}"));
            ItemReport::aborted(index, &url, reason)
        }
    }
}
