//! Fixed-profile VOD encode of a short preview clip.
//!
//! Previews are always 480p H.264 at 900k with no audio, segmented into a
//! finalized VOD playlist. Unlike the main transcode path there is no
//! supervision: the encode runs once to completion or failure.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::command::ToolCommand;
use crate::locks::LockRegistry;
use crate::tools::ToolRegistry;

/// Hard limit for a preview encode.
const PREVIEW_TIMEOUT: Duration = Duration::from_secs(300);

/// One preview encode request.
#[derive(Debug, Clone)]
pub struct PreviewJob {
    /// Source file.
    pub input: PathBuf,
    /// Output directory (`hls_preview/preview_<id>/`).
    pub output_dir: PathBuf,
    /// Seconds into the source to start from.
    pub start_offset: u32,
    /// Clip length in seconds (at most 120).
    pub duration: u32,
}

/// Encode a preview clip into `job.output_dir`.
///
/// Writes `index.m3u8`, `init.mp4`, and `preview_NNN.mp4` segments.
///
/// # Errors
///
/// - [`vf_core::Error::Busy`] when another preview encode holds the lock.
/// - [`vf_core::Error::Encode`] with a stderr tail when ffmpeg fails.
pub async fn encode_preview(
    tools: &ToolRegistry,
    locks: &LockRegistry,
    job: &PreviewJob,
) -> vf_core::Result<()> {
    let ffmpeg = tools.require("ffmpeg")?;
    std::fs::create_dir_all(&job.output_dir)?;

    let lockfile = job.output_dir.join("lockfile.lock");
    if !locks.try_acquire(&lockfile)? {
        return Err(vf_core::Error::Busy("preview encode already in progress".into()));
    }

    let result = encode_locked(ffmpeg.path.clone(), job).await;
    locks.release(&lockfile);
    result
}

async fn encode_locked(ffmpeg: PathBuf, job: &PreviewJob) -> vf_core::Result<()> {
    let playlist = job.output_dir.join("index.m3u8");

    tracing::info!(
        input = %job.input.display(),
        start_offset = job.start_offset,
        duration = job.duration,
        "Encoding preview"
    );

    let mut cmd = ToolCommand::new(ffmpeg);
    cmd.timeout(PREVIEW_TIMEOUT);
    cmd.args(["-y", "-ss"]);
    cmd.arg(job.start_offset.to_string());
    cmd.arg("-i");
    cmd.arg(job.input.to_string_lossy().as_ref());
    cmd.arg("-t");
    cmd.arg(job.duration.to_string());
    cmd.args(["-vf", "scale=-2:480"]);
    cmd.args(["-c:v", "libx264", "-preset", "medium", "-b:v", "900k"]);
    cmd.arg("-an");
    cmd.args(["-movflags", "+faststart+frag_keyframe+empty_moov+default_base_moof"]);
    cmd.args(["-f", "hls"]);
    cmd.args(["-hls_time", "5"]);
    cmd.args(["-hls_playlist_type", "vod"]);
    cmd.args(["-hls_segment_type", "fmp4"]);
    cmd.args(["-hls_fmp4_init_filename", "init.mp4"]);
    cmd.arg("-hls_segment_filename");
    cmd.arg(job.output_dir.join("preview_%03d.mp4").to_string_lossy().as_ref());
    cmd.arg(playlist.to_string_lossy().as_ref());

    let output = cmd.capture().await?;
    if !output.status.success() {
        return Err(vf_core::Error::encode(output.stderr));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn busy_when_lock_held() {
        let dir = tempfile::tempdir().unwrap();
        let locks = LockRegistry::new();
        assert!(locks
            .try_acquire(&dir.path().join("lockfile.lock"))
            .unwrap());

        let job = PreviewJob {
            input: PathBuf::from("/in.mp4"),
            output_dir: dir.path().to_path_buf(),
            start_offset: 180,
            duration: 120,
        };

        // Registry is irrelevant; the lock check runs after tool lookup, so
        // supply a stand-in to get past `require`.
        let Ok(echo) = which::which("echo") else {
            return;
        };
        let tools = ToolRegistry::discover(&vf_core::config::ToolsConfig {
            ffmpeg_path: Some(echo),
            ffprobe_path: None,
        });

        let err = encode_preview(&tools, &locks, &job).await.unwrap_err();
        assert!(matches!(err, vf_core::Error::Busy(_)));
    }

    #[tokio::test]
    async fn missing_tool_is_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let job = PreviewJob {
            input: PathBuf::from("/in.mp4"),
            output_dir: dir.path().to_path_buf(),
            start_offset: 0,
            duration: 30,
        };
        let err = encode_preview(&ToolRegistry::default(), &LockRegistry::new(), &job)
            .await
            .unwrap_err();
        assert!(matches!(err, vf_core::Error::Tool { .. }));
    }
}
