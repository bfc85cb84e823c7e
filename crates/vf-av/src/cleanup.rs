//! Removal of abandoned transcode output directories.
//!
//! Viewers come and go; output directories whose newest artifact is old and
//! that no encoder currently owns are safe to reclaim. Run from the CLI
//! (`videoflix cleanup-transcodes`), typically via cron.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::locks::CONTINUOUS_LOCK;

/// Remove inactive `(video, resolution)` output directories under
/// `transcode_root`.
///
/// A directory is removed when it carries no lockfile or continuous
/// descriptor and none of its entries was modified within `inactive_for`.
/// Returns the removed paths.
pub fn cleanup_inactive_outputs(
    transcode_root: &Path,
    inactive_for: Duration,
) -> vf_core::Result<Vec<PathBuf>> {
    let mut removed = Vec::new();

    if !transcode_root.exists() {
        return Ok(removed);
    }

    for video_entry in std::fs::read_dir(transcode_root)? {
        let video_dir = video_entry?.path();
        if !video_dir.is_dir() {
            continue;
        }

        for res_entry in std::fs::read_dir(&video_dir)? {
            let output_dir = res_entry?.path();
            if !output_dir.is_dir() {
                continue;
            }

            if output_dir.join("lockfile.lock").exists()
                || output_dir.join(CONTINUOUS_LOCK).exists()
            {
                continue;
            }

            if let Some(newest) = newest_mtime(&output_dir) {
                let age = newest.elapsed().unwrap_or(Duration::ZERO);
                if age > inactive_for {
                    tracing::info!(
                        dir = %output_dir.display(),
                        age_secs = age.as_secs(),
                        "Removing inactive transcode directory"
                    );
                    std::fs::remove_dir_all(&output_dir)?;
                    removed.push(output_dir);
                }
            }
        }

        // Drop the per-video directory once all its resolutions are gone.
        if std::fs::read_dir(&video_dir)?.next().is_none() {
            let _ = std::fs::remove_dir(&video_dir);
        }
    }

    Ok(removed)
}

fn newest_mtime(dir: &Path) -> Option<SystemTime> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut newest = std::fs::metadata(dir).and_then(|m| m.modified()).ok();

    for entry in entries.flatten() {
        if let Ok(mtime) = entry.metadata().and_then(|m| m.modified()) {
            newest = Some(match newest {
                Some(n) if n >= mtime => n,
                _ => mtime,
            });
        }
    }

    newest
}
