#![forbid(unsafe_code)]

//! Bulk playlist downloader built on an external fetcher (yt-dlp) and muxer
//! (ffmpeg).
//!
//! The [`orchestrator`] lists the playlist, applies the selection range and
//! runs the [`pipeline`] for every selected item, one at a time or on a
//! bounded worker pool. Every external program is reached through the
//! [`runner::CommandRunner`] trait and every user-facing message through the
//! [`report::Reporter`] trait, so both can be swapped out.

pub mod assemble;
pub mod config;
pub mod error;
pub mod fetch;
pub mod layout;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod runner;
pub mod sanitize;
pub mod title;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{DownloadMode, JobConfig};
pub use error::RunError;
pub use orchestrator::{Orchestrator, RunSummary};
