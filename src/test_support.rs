//! Fakes shared by the unit tests.

use crate::config::{ConfigFile, DownloadMode, JobConfig};
use crate::report::Reporter;
use crate::runner::{CommandOutput, CommandRunner};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Level;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|value| value == arg)
    }

    pub fn arg_after(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|value| value == flag)
            .and_then(|index| self.args.get(index + 1))
            .map(String::as_str)
    }

    pub fn last_arg(&self) -> &str {
        self.args.last().map(String::as_str).unwrap_or_default()
    }
}

type Script = Box<dyn Fn(&Invocation) -> CommandOutput + Send + Sync>;

/// Records every call and answers with a scripted closure.
pub struct FakeRunner {
    calls: Mutex<Vec<Invocation>>,
    script: Script,
}

impl FakeRunner {
    pub fn new(script: impl Fn(&Invocation) -> CommandOutput + Send + Sync + 'static) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            script: Box::new(script),
        }
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, program: &str, args: &[String]) -> CommandOutput {
        let invocation = Invocation {
            program: program.to_string(),
            args: args.to_vec(),
        };
        self.calls.lock().push(invocation.clone());
        (self.script)(&invocation)
    }
}

/// Behaves like yt-dlp + ffmpeg against the real temp directory.
#[derive(Debug, Clone, Default)]
pub struct ToolSim {
    pub playlist: Vec<String>,
    pub titles: HashMap<String, String>,
    pub failing_video: HashSet<String>,
    pub failing_audio: HashSet<String>,
    /// Fetch succeeds but writes nothing.
    pub silent_fetch: HashSet<String>,
    /// Panics inside the runner for these URLs.
    pub panicking: HashSet<String>,
    pub mux_fails: bool,
    /// After merging, the audio input is replaced by a directory so it
    /// cannot be removed with `remove_file`.
    pub mux_locks_inputs: bool,
    /// Print the produced path like `--print after_move:filepath` does.
    pub report_paths: bool,
}

impl ToolSim {
    pub fn with_items(count: usize) -> Self {
        let playlist: Vec<String> = (1..=count)
            .map(|index| format!("https://example.test/watch?v={index}"))
            .collect();
        let titles = playlist
            .iter()
            .enumerate()
            .map(|(index, url)| (url.clone(), format!("Video {}", index + 1)))
            .collect();
        Self {
            playlist,
            titles,
            report_paths: true,
            ..Self::default()
        }
    }

    pub fn url(&self, index: usize) -> String {
        self.playlist[index - 1].clone()
    }

    pub fn into_runner(self) -> FakeRunner {
        FakeRunner::new(move |call| self.respond(call))
    }

    fn respond(&self, call: &Invocation) -> CommandOutput {
        if call.has_arg("--version") || call.has_arg("-version") {
            return CommandOutput::ok("1.0\n");
        }
        if call.program == "ffmpeg" {
            if self.mux_fails {
                return CommandOutput::failed(Some(1), "Invalid data found when processing input");
            }
            let output = PathBuf::from(call.last_arg());
            fs::write(&output, b"merged").unwrap();
            if self.mux_locks_inputs {
                let audio = call
                    .args
                    .iter()
                    .enumerate()
                    .filter(|(_, arg)| *arg == "-i")
                    .filter_map(|(index, _)| call.args.get(index + 1))
                    .last()
                    .map(PathBuf::from)
                    .unwrap();
                fs::remove_file(&audio).unwrap();
                fs::create_dir(&audio).unwrap();
            }
            return CommandOutput::ok("");
        }

        let url = call.last_arg().to_string();
        if self.panicking.contains(&url) {
            panic!("simulated crash for {url}");
        }
        if call.has_arg("--flat-playlist") {
            return CommandOutput::ok(self.playlist.join("\n") + "\n");
        }
        if call.has_arg("--get-title") {
            return match self.titles.get(&url) {
                Some(title) => CommandOutput::ok(format!("{title}\n")),
                None => CommandOutput::failed(Some(1), "ERROR: Video unavailable"),
            };
        }
        if let Some(selector) = call.arg_after("-f") {
            let (failing, ext) = if selector == "bestvideo" {
                (&self.failing_video, "webm")
            } else {
                (&self.failing_audio, "m4a")
            };
            if failing.contains(&url) {
                return CommandOutput::failed(Some(1), "ERROR: HTTP Error 503");
            }
            if self.silent_fetch.contains(&url) {
                return CommandOutput::ok("");
            }
            let template = call.arg_after("-o").unwrap_or_default();
            let target = PathBuf::from(template.replace("%(ext)s", ext));
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&target, selector.as_bytes()).unwrap();
            return if self.report_paths {
                CommandOutput::ok(format!("{}\n", target.display()))
            } else {
                CommandOutput::ok("")
            };
        }
        CommandOutput::failed(Some(2), "unexpected invocation")
    }
}

#[derive(Debug, Default)]
pub struct MemoryReporter {
    lines: Mutex<Vec<(Level, String)>>,
}

impl MemoryReporter {
    pub fn count_containing(&self, needle: &str) -> usize {
        self.lines
            .lock()
            .iter()
            .filter(|(_, line)| line.contains(needle))
            .count()
    }

    pub fn has(&self, level: Level, needle: &str) -> bool {
        self.lines
            .lock()
            .iter()
            .any(|(line_level, line)| *line_level == level && line.contains(needle))
    }
}

impl Reporter for MemoryReporter {
    fn record(&self, level: Level, message: &str) {
        self.lines.lock().push((level, message.to_string()));
    }
}

/// Valid configuration rooted at `output`.
pub fn job_config(output: &Path, mode: DownloadMode, parallel: i64) -> JobConfig {
    ConfigFile {
        playlist_url: Some("https://example.test/playlist?list=PL1".into()),
        output: Some(output.to_path_buf()),
        parallel: Some(parallel),
        output_format: Some("mp4".into()),
        mode: Some(mode.to_string()),
        retries: Some(2),
        ..ConfigFile::default()
    }
    .into_job_config()
    .unwrap()
}
