#![forbid(unsafe_code)]

//! On-disk layout of a run.
//!
//! ```text
//! <output>/<stem>.<format>           final files
//! <output>/temp/<stem>_video.<ext>   fetched streams, ext chosen by the fetcher
//! <output>/temp/<stem>_audio.<ext>
//! <output>/download.log              run log
//! ```

use crate::error::{Result, RunError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const TEMP_SUBDIR: &str = "temp";
pub const LOG_FILE: &str = "download.log";

/// Placeholder the fetcher replaces with the real extension.
pub const EXT_PLACEHOLDER: &str = "%(ext)s";

/// Which elementary stream a temp file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    pub fn label(self) -> &'static str {
        match self {
            StreamKind::Video => "video",
            StreamKind::Audio => "audio",
        }
    }

    /// yt-dlp format selector for the best stream of this kind.
    pub fn selector(self) -> &'static str {
        match self {
            StreamKind::Video => "bestvideo",
            StreamKind::Audio => "bestaudio",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub output_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub log_file: PathBuf,
}

impl OutputLayout {
    pub fn new(output_dir: &Path, temp_dir: Option<&Path>) -> Self {
        let output_dir = output_dir.to_path_buf();
        let temp_dir = temp_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| output_dir.join(TEMP_SUBDIR));
        let log_file = output_dir.join(LOG_FILE);
        Self {
            output_dir,
            temp_dir,
            log_file,
        }
    }

    /// Creates the output and temp directories so later steps can assume
    /// they exist.
    pub fn prepare(&self) -> Result<()> {
        for dir in [&self.output_dir, &self.temp_dir] {
            fs::create_dir_all(dir).map_err(|source| RunError::Prepare {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    pub fn final_path(&self, stem: &str, format: &str) -> PathBuf {
        self.output_dir.join(format!("{stem}.{format}"))
    }

    /// File name prefix shared by every extension the fetcher may pick.
    pub fn temp_prefix(stem: &str, kind: StreamKind) -> String {
        format!("{stem}_{}.", kind.label())
    }

    /// Output template handed to the fetcher.
    pub fn temp_template(&self, stem: &str, kind: StreamKind) -> PathBuf {
        self.temp_dir.join(format!(
            "{}{EXT_PLACEHOLDER}",
            Self::temp_prefix(stem, kind)
        ))
    }
}
