#![forbid(unsafe_code)]

//! Fatal errors that stop a run before or while the playlist is resolved.
//! Per-item problems never surface here; see [`crate::pipeline::ItemFailure`].

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration file {} not found", path.display())]
    ConfigNotFound { path: PathBuf },

    #[error("reading configuration file {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing configuration file {}: {message}", path.display())]
    ConfigParse { path: PathBuf, message: String },

    #[error("missing required configuration key: {0}")]
    MissingKey(&'static str),

    #[error("invalid value for `{key}`: {message}")]
    InvalidValue { key: &'static str, message: String },

    #[error("unknown mode `{0}` (expected video, audio or both)")]
    UnknownMode(String),

    #[error("error extracting playlist: {0}")]
    PlaylistExtraction(String),

    #[error("no videos found in the playlist")]
    EmptyPlaylist,

    #[error(
        "invalid range {start}..{end}: ensure 1 <= start <= end <= {total} (total videos in playlist)"
    )]
    InvalidRange { start: i64, end: i64, total: usize },

    #[error("{program} is not usable: {message}")]
    ToolUnavailable { program: String, message: String },

    #[error("preparing {}: {source}", path.display())]
    Prepare {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, RunError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_names_the_key() {
        let err = RunError::MissingKey("retries");
        assert_eq!(
            err.to_string(),
            "missing required configuration key: retries"
        );
    }

    #[test]
    fn invalid_range_mentions_bounds() {
        let err = RunError::InvalidRange {
            start: 5,
            end: 3,
            total: 10,
        };
        let text = err.to_string();
        assert!(text.contains("5..3"));
        assert!(text.contains("<= 10"));
    }
}
