#![forbid(unsafe_code)]

//! Thin boundary around external programs (yt-dlp, ffmpeg).
//!
//! Every invocation is turned into a [`CommandOutput`] value. A missing
//! binary, a non-zero exit and a timeout are all reported as unsuccessful
//! outputs rather than errors, so callers only ever inspect one shape. The
//! runner never retries; retry policy belongs to the caller.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Captured result of one finished (or failed-to-start) process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Best human-readable reason for a failure: stderr if there is any,
    /// otherwise the exit code.
    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        match self.code {
            Some(code) => format!("exited with status {code}"),
            None => "terminated without an exit status".to_string(),
        }
    }

    /// Last non-empty stdout line, trimmed.
    pub fn last_line(&self) -> Option<&str> {
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args` and waits for it to exit.
    async fn run(&self, program: &str, args: &[String]) -> CommandOutput;
}

/// Runs real subprocesses through tokio.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kills any command that is still running after `timeout`.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> CommandOutput {
        tracing::debug!(program, args = %args.join(" "), "spawning command");

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let pending = command.output();
        let finished = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, pending).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(program, ?limit, "command timed out");
                    return CommandOutput::failed(
                        None,
                        format!("{program} timed out after {}s", limit.as_secs_f64()),
                    );
                }
            },
            None => pending.await,
        };

        match finished {
            Ok(output) => CommandOutput {
                success: output.status.success(),
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
            Err(err) => {
                tracing::debug!(program, error = %err, "command could not be started");
                CommandOutput::failed(None, format!("failed to run {program}: {err}"))
            }
        }
    }
}

/// Runs `<program> <probe_arg>` to fail loudly when a dependency such as
/// yt-dlp is missing.
pub async fn probe_program(
    runner: &dyn CommandRunner,
    program: &str,
    probe_arg: &str,
) -> Result<(), String> {
    let output = runner.run(program, &[probe_arg.to_string()]).await;
    if output.success {
        Ok(())
    } else {
        Err(output.error_text())
    }
}
