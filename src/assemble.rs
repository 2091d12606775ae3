#![forbid(unsafe_code)]

//! Turns fetched temp streams into the final file: mux video + audio, or
//! move a single stream into place.

use crate::layout::{OutputLayout, StreamKind};
use crate::runner::CommandRunner;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// Leftovers of an unfinished fetch; never a usable stream.
const PARTIAL_SUFFIXES: [&str; 3] = [".part", ".ytdl", ".temp"];

/// `EXDEV` on Linux and macOS.
const EXDEV: i32 = 18;

/// Finds the temp file the fetcher wrote for `stem`/`kind` when its
/// extension is unknown. Matching is exact up to the `_<kind>.` separator so
/// `A` never picks up files that belong to `A_video`. Leftovers from earlier
/// runs may match too; the most recently modified file wins.
pub fn locate_stream(temp_dir: &Path, stem: &str, kind: StreamKind) -> Option<PathBuf> {
    let prefix = OutputLayout::temp_prefix(stem, kind);
    WalkDir::new(temp_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            name.len() > prefix.len()
                && name.starts_with(&prefix)
                && !PARTIAL_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
        })
        .map(|entry| {
            let modified = entry
                .metadata()
                .ok()
                .and_then(|meta| meta.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, entry.into_path())
        })
        .max_by(|(a_time, a_path), (b_time, b_path)| {
            a_time.cmp(b_time).then_with(|| b_path.cmp(a_path))
        })
        .map(|(_, path)| path)
}

/// Arguments for remuxing: video copied untouched, audio re-encoded,
/// existing output overwritten.
pub fn merge_args(video: &Path, audio: &Path, output: &Path, audio_codec: &str) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-y".to_string(),
        "-i".to_string(),
        video.to_string_lossy().into_owned(),
        "-i".to_string(),
        audio.to_string_lossy().into_owned(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        audio_codec.to_string(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Runs the muxer. On failure the inputs are left alone and the muxer's
/// error text is returned; a partial output file may exist.
pub async fn merge_streams(
    runner: &dyn CommandRunner,
    muxer: &str,
    audio_codec: &str,
    video: &Path,
    audio: &Path,
    output: &Path,
) -> Result<(), String> {
    let result = runner
        .run(muxer, &merge_args(video, audio, output, audio_codec))
        .await;
    if result.success {
        Ok(())
    } else {
        Err(result.error_text())
    }
}

/// Deletes consumed temp inputs. Returns one message per file that could not
/// be removed.
pub fn remove_inputs(paths: &[&Path]) -> Vec<String> {
    paths
        .iter()
        .filter_map(|path| match fs::remove_file(path) {
            Ok(()) => None,
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => Some(format!("could not remove {}: {err}", path.display())),
        })
        .collect()
}

/// Moves a single fetched stream to its final path. When the temp dir sits
/// on another filesystem the rename fails with EXDEV and the file is copied
/// across instead.
pub async fn relocate(source: &Path, destination: &Path) -> io::Result<()> {
    match tokio::fs::rename(source, destination).await {
        Ok(()) => Ok(()),
        Err(err) if is_cross_device(&err) => {
            tracing::debug!(
                source = %source.display(),
                destination = %destination.display(),
                "cross-device rename, copying instead"
            );
            copy_across(source, destination).await
        }
        Err(err) => Err(err),
    }
}

fn is_cross_device(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::CrossesDevices || err.raw_os_error() == Some(EXDEV)
}

/// Copies into a staging file beside `destination`, renames it into place
/// (same filesystem, so atomic) and then drops the source.
async fn copy_across(source: &Path, destination: &Path) -> io::Result<()> {
    let staging = staging_path(destination);
    if let Err(err) = tokio::fs::copy(source, &staging).await {
        discard(&staging).await;
        return Err(err);
    }
    if let Err(err) = tokio::fs::rename(&staging, destination).await {
        discard(&staging).await;
        return Err(err);
    }
    if let Err(err) = tokio::fs::remove_file(source).await {
        tracing::warn!(
            source = %source.display(),
            error = %err,
            "could not remove source after cross-device move"
        );
    }
    Ok(())
}

fn staging_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".moving");
    destination.with_file_name(name)
}

async fn discard(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await
        && err.kind() != io::ErrorKind::NotFound
    {
        tracing::debug!(path = %path.display(), error = %err, "could not remove staging file");
    }
}
