#![forbid(unsafe_code)]

//! Run configuration: a JSON (or TOML) file, optionally overridden from the
//! command line, validated once into an immutable [`JobConfig`].

use crate::error::{Result, RunError};
use crate::layout::OutputLayout;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const DEFAULT_FETCHER: &str = "yt-dlp";
pub const DEFAULT_MUXER: &str = "ffmpeg";
pub const DEFAULT_AUDIO_CODEC: &str = "aac";

/// Keys that must be present, checked in this order.
pub const REQUIRED_KEYS: [&str; 6] = [
    "playlist_url",
    "output",
    "parallel",
    "output_format",
    "mode",
    "retries",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadMode {
    Video,
    Audio,
    Both,
}

impl FromStr for DownloadMode {
    type Err = RunError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "video" => Ok(DownloadMode::Video),
            "audio" => Ok(DownloadMode::Audio),
            "both" => Ok(DownloadMode::Both),
            _ => Err(RunError::UnknownMode(value.to_string())),
        }
    }
}

impl fmt::Display for DownloadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DownloadMode::Video => "video",
            DownloadMode::Audio => "audio",
            DownloadMode::Both => "both",
        })
    }
}

/// 1-based inclusive bounds into the playlist. `end == 0` (or no end)
/// means "through the last item".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionRange {
    pub start: i64,
    pub end: Option<i64>,
}

impl Default for SelectionRange {
    fn default() -> Self {
        Self {
            start: 1,
            end: None,
        }
    }
}

impl SelectionRange {
    /// Resolves against a playlist of `total` items into concrete
    /// `(start, end)` 1-based inclusive bounds.
    pub fn resolve(&self, total: usize) -> Result<(usize, usize)> {
        let start = self.start;
        let end = match self.end {
            None | Some(0) => total as i64,
            Some(end) => end,
        };
        if start < 1 || end > total as i64 || start > end {
            return Err(RunError::InvalidRange { start, end, total });
        }
        Ok((start as usize, end as usize))
    }
}

/// External programs and how they are driven.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolConfig {
    pub fetcher: String,
    pub muxer: String,
    pub audio_codec: String,
    pub command_timeout: Option<Duration>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            fetcher: DEFAULT_FETCHER.to_string(),
            muxer: DEFAULT_MUXER.to_string(),
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            command_timeout: None,
        }
    }
}

/// Immutable settings for one run, shared read-only by every item job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfig {
    pub playlist_url: String,
    pub layout: OutputLayout,
    pub output_format: String,
    pub mode: DownloadMode,
    pub retries: u32,
    pub parallel: usize,
    pub range: SelectionRange,
    pub tools: ToolConfig,
}

/// Configuration file as written by the user. Everything is optional here
/// so missing keys can be reported by name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub playlist_url: Option<String>,
    pub output: Option<PathBuf>,
    pub parallel: Option<i64>,
    pub output_format: Option<String>,
    pub mode: Option<String>,
    pub retries: Option<i64>,
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub temp_dir: Option<PathBuf>,
    pub fetcher: Option<String>,
    pub muxer: Option<String>,
    pub audio_codec: Option<String>,
    pub command_timeout_secs: Option<i64>,
}

/// Command-line values that win over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub output: Option<PathBuf>,
    pub parallel: Option<i64>,
    pub mode: Option<String>,
    pub retries: Option<i64>,
    pub start: Option<i64>,
    pub end: Option<i64>,
}

pub fn load_job_config(path: &Path, overrides: ConfigOverrides) -> Result<JobConfig> {
    let file = read_config_file(path)?;
    file.with_overrides(overrides).into_job_config()
}

/// Reads the file, picking the parser from the extension: `.toml` is TOML,
/// anything else JSON.
pub fn read_config_file(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        return Err(RunError::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }
    let content = fs::read_to_string(path).map_err(|source| RunError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_error = |message: String| RunError::ConfigParse {
        path: path.to_path_buf(),
        message,
    };
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        toml::from_str(&content).map_err(|err| parse_error(err.to_string()))
    } else {
        serde_json::from_str(&content).map_err(|err| parse_error(err.to_string()))
    }
}

impl ConfigFile {
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.output = overrides.output.or(self.output);
        self.parallel = overrides.parallel.or(self.parallel);
        self.mode = overrides.mode.or(self.mode);
        self.retries = overrides.retries.or(self.retries);
        self.start = overrides.start.or(self.start);
        self.end = overrides.end.or(self.end);
        self
    }

    pub fn into_job_config(self) -> Result<JobConfig> {
        let Some(playlist_url) = self.playlist_url else {
            return Err(RunError::MissingKey(REQUIRED_KEYS[0]));
        };
        let Some(output) = self.output else {
            return Err(RunError::MissingKey(REQUIRED_KEYS[1]));
        };
        let Some(parallel) = self.parallel else {
            return Err(RunError::MissingKey(REQUIRED_KEYS[2]));
        };
        let Some(output_format) = self.output_format else {
            return Err(RunError::MissingKey(REQUIRED_KEYS[3]));
        };
        let Some(mode) = self.mode else {
            return Err(RunError::MissingKey(REQUIRED_KEYS[4]));
        };
        let Some(retries) = self.retries else {
            return Err(RunError::MissingKey(REQUIRED_KEYS[5]));
        };

        let playlist_url = non_blank("playlist_url", playlist_url)?;
        let output_format = non_blank("output_format", output_format)?;
        if output_format.contains(['/', '\\']) {
            return Err(invalid("output_format", "must be a bare extension"));
        }
        let output_format = output_format.trim_start_matches('.').to_string();
        if output_format.is_empty() {
            return Err(invalid("output_format", "must not be empty"));
        }
        if output.as_os_str().is_empty() {
            return Err(invalid("output", "must not be empty"));
        }
        let mode = mode.parse::<DownloadMode>()?;
        let parallel = at_least_one("parallel", parallel)?;
        let retries = at_least_one("retries", retries)?;
        let retries = u32::try_from(retries).map_err(|_| RunError::InvalidValue {
            key: "retries",
            message: format!("must be at most {}, got {retries}", u32::MAX),
        })?;
        let command_timeout = self
            .command_timeout_secs
            .map(|secs| at_least_one("command_timeout_secs", secs))
            .transpose()?
            .map(|secs| Duration::from_secs(secs as u64));

        let defaults = ToolConfig::default();
        let tools = ToolConfig {
            fetcher: optional_value(self.fetcher).unwrap_or(defaults.fetcher),
            muxer: optional_value(self.muxer).unwrap_or(defaults.muxer),
            audio_codec: optional_value(self.audio_codec).unwrap_or(defaults.audio_codec),
            command_timeout,
        };

        Ok(JobConfig {
            playlist_url,
            layout: OutputLayout::new(&output, self.temp_dir.as_deref()),
            output_format,
            mode,
            retries,
            parallel: parallel as usize,
            range: SelectionRange {
                start: self.start.unwrap_or(1),
                end: self.end,
            },
            tools,
        })
    }
}

fn invalid(key: &'static str, message: &str) -> RunError {
    RunError::InvalidValue {
        key,
        message: message.to_string(),
    }
}

fn non_blank(key: &'static str, value: String) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid(key, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn at_least_one(key: &'static str, value: i64) -> Result<i64> {
    if value < 1 {
        return Err(RunError::InvalidValue {
            key,
            message: format!("must be at least 1, got {value}"),
        });
    }
    Ok(value)
}

fn optional_value(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    fn make_config(suffix: &str, contents: &str) -> NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    const FULL_JSON: &str = r#"{
        "playlist_url": "https://www.youtube.com/playlist?list=PL123",
        "output": "/downloads/list",
        "parallel": 4,
        "output_format": "mkv",
        "mode": "both",
        "retries": 3
    }"#;

    #[test]
    fn load_reads_required_keys_and_defaults() {
        let cfg = make_config(".json", FULL_JSON);
        let config = load_job_config(cfg.path(), ConfigOverrides::default()).unwrap();
        assert_eq!(config.playlist_url, "https://www.youtube.com/playlist?list=PL123");
        assert_eq!(config.layout.output_dir, PathBuf::from("/downloads/list"));
        assert_eq!(config.layout.temp_dir, PathBuf::from("/downloads/list/temp"));
        assert_eq!(config.parallel, 4);
        assert_eq!(config.output_format, "mkv");
        assert_eq!(config.mode, DownloadMode::Both);
        assert_eq!(config.retries, 3);
        assert_eq!(config.range, SelectionRange::default());
        assert_eq!(config.tools, ToolConfig::default());
    }

    #[test]
    fn load_reads_toml_files() {
        let cfg = make_config(
            ".toml",
            r#"
            playlist_url = "https://example.test/list"
            output = "/srv/media"
            parallel = 1
            output_format = "mp3"
            mode = "audio"
            retries = 5
            start = 2
            end = 0
            fetcher = "/opt/bin/yt-dlp"
            command_timeout_secs = 600
            "#,
        );
        let config = load_job_config(cfg.path(), ConfigOverrides::default()).unwrap();
        assert_eq!(config.mode, DownloadMode::Audio);
        assert_eq!(config.range, SelectionRange { start: 2, end: Some(0) });
        assert_eq!(config.tools.fetcher, "/opt/bin/yt-dlp");
        assert_eq!(config.tools.muxer, DEFAULT_MUXER);
        assert_eq!(config.tools.command_timeout, Some(Duration::from_secs(600)));
    }

    #[test]
    fn missing_key_is_named_in_order() {
        let cfg = make_config(
            ".json",
            r#"{"playlist_url": "u", "output": "/o", "output_format": "mp4"}"#,
        );
        let err = load_job_config(cfg.path(), ConfigOverrides::default()).unwrap_err();
        assert!(matches!(err, RunError::MissingKey("parallel")));
    }

    #[test]
    fn overrides_take_precedence_and_fill_missing_keys() {
        let cfg = make_config(
            ".json",
            r#"{"playlist_url": "u", "output": "/o", "parallel": 2,
                "output_format": "mp4", "mode": "video", "start": 4}"#,
        );
        let config = load_job_config(
            cfg.path(),
            ConfigOverrides {
                retries: Some(7),
                parallel: Some(1),
                mode: Some("both".into()),
                end: Some(9),
                ..ConfigOverrides::default()
            },
        )
        .unwrap();
        assert_eq!(config.retries, 7);
        assert_eq!(config.parallel, 1);
        assert_eq!(config.mode, DownloadMode::Both);
        assert_eq!(config.range, SelectionRange { start: 4, end: Some(9) });
    }

    #[test]
    fn rejects_unknown_mode() {
        let file = ConfigFile {
            mode: Some("karaoke".into()),
            ..serde_json::from_str(FULL_JSON).unwrap()
        };
        let err = file.into_job_config().unwrap_err();
        assert!(matches!(err, RunError::UnknownMode(ref mode) if mode == "karaoke"));
    }

    #[test]
    fn rejects_non_positive_counts() {
        let base: ConfigFile = serde_json::from_str(FULL_JSON).unwrap();
        let err = ConfigFile {
            parallel: Some(0),
            ..base.clone()
        }
        .into_job_config()
        .unwrap_err();
        assert!(matches!(err, RunError::InvalidValue { key: "parallel", .. }));

        let err = ConfigFile {
            retries: Some(-1),
            ..base
        }
        .into_job_config()
        .unwrap_err();
        assert!(matches!(err, RunError::InvalidValue { key: "retries", .. }));
    }

    #[test]
    fn rejects_retries_beyond_u32() {
        let mut file: ConfigFile = serde_json::from_str(FULL_JSON).unwrap();
        file.retries = Some(4_294_967_297);
        let err = file.into_job_config().unwrap_err();
        assert!(matches!(err, RunError::InvalidValue { key: "retries", .. }));

        let mut file: ConfigFile = serde_json::from_str(FULL_JSON).unwrap();
        file.retries = Some(i64::from(u32::MAX));
        assert_eq!(file.into_job_config().unwrap().retries, u32::MAX);
    }

    #[test]
    fn output_format_must_be_bare_extension() {
        let base: ConfigFile = serde_json::from_str(FULL_JSON).unwrap();
        let err = ConfigFile {
            output_format: Some("../mp4".into()),
            ..base.clone()
        }
        .into_job_config()
        .unwrap_err();
        assert!(matches!(err, RunError::InvalidValue { key: "output_format", .. }));

        let config = ConfigFile {
            output_format: Some(".webm".into()),
            ..base
        }
        .into_job_config()
        .unwrap();
        assert_eq!(config.output_format, "webm");
    }

    #[test]
    fn missing_file_and_bad_syntax_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_config_file(&dir.path().join("config.json")).unwrap_err();
        assert!(matches!(err, RunError::ConfigNotFound { .. }));

        let cfg = make_config(".json", "{ not json");
        let err = read_config_file(cfg.path()).unwrap_err();
        assert!(matches!(err, RunError::ConfigParse { .. }));
    }

    #[test]
    fn selection_range_resolves_bounds() {
        let range = SelectionRange { start: 3, end: Some(0) };
        assert_eq!(range.resolve(10).unwrap(), (3, 10));
        assert_eq!(SelectionRange::default().resolve(4).unwrap(), (1, 4));
        assert_eq!(
            SelectionRange { start: 2, end: Some(2) }.resolve(2).unwrap(),
            (2, 2)
        );
    }

    #[test]
    fn selection_range_rejects_invalid_bounds() {
        for (start, end) in [(5, Some(3)), (0, None), (1, Some(11)), (11, Some(0))] {
            let err = SelectionRange { start, end }.resolve(10).unwrap_err();
            assert!(matches!(err, RunError::InvalidRange { total: 10, .. }));
        }
    }

    #[test]
    fn download_mode_parses_case_insensitively() {
        assert_eq!("Both".parse::<DownloadMode>().unwrap(), DownloadMode::Both);
        assert_eq!(" audio ".parse::<DownloadMode>().unwrap(), DownloadMode::Audio);
        assert_eq!(DownloadMode::Video.to_string(), "video");
    }
}
