#![forbid(unsafe_code)]

//! Reporting capability handed to every component of a run.
//!
//! Outcomes meant for the user go through a [`Reporter`]; the default
//! implementation, [`RunLog`], appends timestamped lines to the run's log
//! file and echoes them to the console. Low-level diagnostics (command lines,
//! attempt timings) use `tracing` instead and stay quiet unless `RUST_LOG`
//! asks for them.

use chrono::Local;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub const DISCLAIMER: &str = "Disclaimer: This tool is for downloading content only for lawful purposes and in accordance with the source site's terms of service.";

pub trait Reporter: Send + Sync {
    fn record(&self, level: Level, message: &str);

    fn info(&self, message: &str) {
        self.record(Level::INFO, message);
    }

    fn warn(&self, message: &str) {
        self.record(Level::WARN, message);
    }

    fn error(&self, message: &str) {
        self.record(Level::ERROR, message);
    }
}

/// File + console sink for one run.
pub struct RunLog {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
    echo: bool,
}

impl RunLog {
    /// Opens (appending) the log file. `echo` mirrors every line to
    /// stdout/stderr.
    pub fn open(path: &Path, echo: bool) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(Some(BufWriter::new(file))),
            echo,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes and closes the file. Later records only reach the console.
    pub fn finish(&self) {
        if let Some(mut writer) = self.writer.lock().take()
            && let Err(err) = writer.flush()
        {
            eprintln!("Warning: could not flush {}: {err}", self.path.display());
        }
    }
}

impl Reporter for RunLog {
    fn record(&self, level: Level, message: &str) {
        let line = format_line(level, message);

        if let Some(writer) = self.writer.lock().as_mut() {
            // Flushing per line keeps the log useful if the run is killed.
            if let Err(err) = writeln!(writer, "{line}").and_then(|_| writer.flush()) {
                eprintln!("Warning: could not write {}: {err}", self.path.display());
            }
        }

        if self.echo {
            if level <= Level::WARN {
                eprintln!("{line}");
            } else {
                println!("{line}");
            }
        }
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        self.finish();
    }
}

/// `2024-01-01 12:00:00,123 INFO: message`
pub fn format_line(level: Level, message: &str) -> String {
    format!(
        "{} {}: {}",
        Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
        level,
        message
    )
}

/// Installs the global diagnostics subscriber. Respects `RUST_LOG`, falls
/// back to warnings only. Safe to call more than once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(filter)
        .try_init();
}
