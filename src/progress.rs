#![forbid(unsafe_code)]

//! Optional machine-readable progress file, rewritten atomically after every
//! finished item so another process can poll it.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressReport {
    pub progress: u8,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ProgressWriter {
    path: PathBuf,
}

impl ProgressWriter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn write(&self, progress: u8, message: &str) {
        let report = ProgressReport {
            progress: progress.min(100),
            message: message.to_string(),
        };

        if let Some(parent) = self.path.parent()
            && let Err(err) = fs::create_dir_all(parent)
        {
            tracing::warn!(error = %err, "could not create progress dir");
            return;
        }

        let tmp_path = self.path.with_extension("tmp");
        match serde_json::to_vec(&report) {
            Ok(payload) => {
                if let Err(err) = fs::write(&tmp_path, payload) {
                    tracing::warn!(error = %err, "could not write progress file");
                    return;
                }
                if let Err(err) = fs::rename(&tmp_path, &self.path) {
                    tracing::warn!(error = %err, "could not finalize progress file");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "could not serialize progress report");
            }
        }
    }

    /// Writes `done/total` as a percentage.
    pub fn write_count(&self, done: usize, total: usize, message: &str) {
        let percent = if total == 0 {
            100
        } else {
            ((done.min(total) * 100) / total) as u8
        };
        self.write(percent, message);
    }
}

pub fn update_progress(progress: Option<&ProgressWriter>, done: usize, total: usize, message: &str) {
    if let Some(writer) = progress {
        writer.write_count(done, total, message);
    }
}
