#![forbid(unsafe_code)]

//! Pulls one elementary stream of an item into the temp directory.

use crate::layout::StreamKind;
use crate::report::Reporter;
use crate::runner::CommandRunner;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    pub item_url: &'a str,
    pub kind: StreamKind,
    /// Output path containing the `%(ext)s` placeholder.
    pub template: &'a Path,
    pub max_retries: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedStream {
    pub attempts: u32,
    /// Final path printed by the fetcher, when it printed one that exists.
    pub reported_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} stream failed after {attempts} attempt(s): {last_error}")]
pub struct FetchFailure {
    pub kind: StreamKind,
    pub attempts: u32,
    pub last_error: String,
}

/// `--continue` resumes a partial file left by an earlier attempt, and
/// `--print after_move:filepath` makes the fetcher tell us which extension it
/// picked.
pub fn fetch_args(request: &FetchRequest<'_>) -> Vec<String> {
    vec![
        "-f".to_string(),
        request.kind.selector().to_string(),
        "--continue".to_string(),
        "--no-warnings".to_string(),
        "-o".to_string(),
        request.template.to_string_lossy().into_owned(),
        "--print".to_string(),
        "after_move:filepath".to_string(),
        "--no-simulate".to_string(),
        request.item_url.to_string(),
    ]
}

/// Invokes the fetcher until it succeeds or `max_retries` attempts have been
/// made (at least one attempt always happens).
pub async fn fetch_stream(
    runner: &dyn CommandRunner,
    fetcher: &str,
    request: &FetchRequest<'_>,
    reporter: &dyn Reporter,
) -> Result<FetchedStream, FetchFailure> {
    let args = fetch_args(request);
    let max_attempts = request.max_retries.max(1);
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        reporter.info(&format!(
            "Attempt {attempt} for: {fetcher} {}",
            args.join(" ")
        ));
        let output = runner.run(fetcher, &args).await;
        if output.success {
            let reported_path = output
                .last_line()
                .map(PathBuf::from)
                .filter(|path| path.is_file());
            return Ok(FetchedStream {
                attempts: attempt,
                reported_path,
            });
        }

        last_error = output.error_text();
        reporter.error(&format!(
            "Attempt {attempt} failed for {}: {last_error}",
            request.item_url
        ));
    }

    Err(FetchFailure {
        kind: request.kind,
        attempts: max_attempts,
        last_error,
    })
}
