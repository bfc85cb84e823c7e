//! Long-running streaming encoder and its heartbeat-driven supervisor.
//!
//! One ffmpeg process per `(video, resolution)` output directory emits
//! successive fMP4 segments from a starting index onwards. The supervisor
//! polls the heartbeat store and drives an explicit state machine:
//!
//! - far ahead of playback -> stop the process (SIGSTOP)
//! - caught up again -> continue it (SIGCONT)
//! - viewer gone for 10 minutes -> kill it
//!
//! The suspend/resume thresholds (40/20) are deliberately far apart so the
//! encoder does not flap when the player pulls at roughly encoder speed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use vf_core::{HeartbeatStore, Resolution, VideoId};

use crate::command::ToolCommand;
use crate::locks::ContinuousLock;
use crate::process;
use crate::segment::{self, EncodeParams};
use crate::tools::ToolRegistry;

/// Supervision loop poll period.
pub const POLL_PERIOD: Duration = Duration::from_secs(2);

/// Kill the encoder after this long without a segment request.
pub const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(600);

/// Suspend when the encoder is this many segments ahead of playback.
pub const SUSPEND_AHEAD: i64 = 40;

/// Resume when the ahead count drops below this.
pub const RESUME_AHEAD: i64 = 20;

/// Everything the supervisor needs to run one streaming encoder.
#[derive(Debug, Clone)]
pub struct ContinuousRequest {
    pub video: VideoId,
    pub resolution: Resolution,
    /// Source file to transcode.
    pub input: PathBuf,
    /// Output directory owned by this worker while it runs.
    pub output_dir: PathBuf,
    /// Segment to start from, e.g. `segment_000.mp4`.
    pub start_segment: String,
    pub params: EncodeParams,
    /// Job id recorded in the descriptor so the scheduler can cancel us.
    pub worker_id: Option<String>,
}

/// How a continuous worker ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuousOutcome {
    /// The encoder reached the end of the source.
    Completed,
    /// The starting segment already existed; nothing to do.
    AlreadyTranscoded,
    /// Self-terminated after 10 minutes without segment requests.
    InactiveTimeout,
    /// Externally cancelled via the cancellation token.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncoderState {
    Encoding,
    Suspended,
}

/// Removes the descriptor and clears the heartbeat on every exit path,
/// including panics and forced kills of the supervisor task.
struct SupervisorCleanup {
    output_dir: PathBuf,
    heartbeat: Arc<HeartbeatStore>,
    video: VideoId,
    resolution: Resolution,
}

impl Drop for SupervisorCleanup {
    fn drop(&mut self) {
        ContinuousLock::remove(&self.output_dir);
        self.heartbeat.clear(self.video, self.resolution);
    }
}

/// Run a streaming encoder under supervision until it finishes, times out,
/// or is cancelled.
pub async fn run_continuous(
    tools: &ToolRegistry,
    req: &ContinuousRequest,
    heartbeat: Arc<HeartbeatStore>,
    cancel: CancellationToken,
) -> vf_core::Result<ContinuousOutcome> {
    let start_index = segment::segment_index(&req.start_segment).ok_or_else(|| {
        vf_core::Error::Validation(format!("invalid segment name: {}", req.start_segment))
    })?;

    if req.output_dir.join(&req.start_segment).exists() {
        tracing::debug!(
            video = %req.video,
            resolution = %req.resolution,
            segment = %req.start_segment,
            "Starting segment already transcoded; skipping continuous encode"
        );
        return Ok(ContinuousOutcome::AlreadyTranscoded);
    }

    let ffmpeg = tools.require("ffmpeg")?;
    std::fs::create_dir_all(&req.output_dir)?;

    let delta = req.params.segment_duration;
    let start_time = delta * start_index as f64;

    let mut cmd = ToolCommand::new(ffmpeg.path.clone());
    cmd.args(["-y", "-ss"]);
    cmd.arg(format!("{start_time}"));
    cmd.arg("-i");
    cmd.arg(req.input.to_string_lossy().as_ref());
    cmd.args(["-vf", req.params.scale.as_str()]);
    cmd.args(["-c:v", req.params.codec.encoder()]);
    cmd.args(["-preset", "medium"]);
    cmd.args(["-b:v", req.params.bitrate.as_str()]);
    cmd.args(["-c:a", req.params.audio.codec_arg()]);
    cmd.args(["-ar", "48000"]);
    cmd.args(["-reset_timestamps", "0"]);
    cmd.args(["-f", "hls"]);
    cmd.arg("-hls_time");
    cmd.arg(format!("{delta}"));
    cmd.args(["-hls_playlist_type", "event"]);
    cmd.args(["-hls_segment_type", "fmp4"]);
    cmd.args(["-hls_flags", "independent_segments+omit_endlist"]);
    cmd.args(["-hls_fmp4_init_filename", "init.mp4"]);
    cmd.arg("-hls_segment_filename");
    cmd.arg(req.output_dir.join("segment_%03d.mp4").to_string_lossy().as_ref());
    cmd.arg(req.output_dir.join("index.m3u8").to_string_lossy().as_ref());

    let mut child = cmd.spawn()?;
    let pid = child
        .id()
        .ok_or_else(|| vf_core::Error::Internal("encoder exited before pid was read".into()))?;

    ContinuousLock {
        pid,
        worker_id: req.worker_id.clone(),
    }
    .write(&req.output_dir)?;

    let _cleanup = SupervisorCleanup {
        output_dir: req.output_dir.clone(),
        heartbeat: heartbeat.clone(),
        video: req.video,
        resolution: req.resolution,
    };

    tracing::info!(
        video = %req.video,
        resolution = %req.resolution,
        pid,
        start = %req.start_segment,
        "Continuous encoder started"
    );

    let mut state = EncoderState::Encoding;

    loop {
        tokio::select! {
            status = child.wait() => {
                let status = status?;
                return if status.success() {
                    tracing::info!(video = %req.video, resolution = %req.resolution, "Continuous encoder finished");
                    Ok(ContinuousOutcome::Completed)
                } else {
                    Err(vf_core::Error::encode(format!(
                        "continuous encoder exited with {status}"
                    )))
                };
            }
            _ = cancel.cancelled() => {
                tracing::info!(video = %req.video, resolution = %req.resolution, "Continuous encoder cancelled");
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Ok(ContinuousOutcome::Cancelled);
            }
            _ = tokio::time::sleep(POLL_PERIOD) => {}
        }

        let Some(hb) = heartbeat.get(req.video, req.resolution) else {
            continue;
        };

        if hb.age() > INACTIVITY_TIMEOUT {
            tracing::info!(
                video = %req.video,
                resolution = %req.resolution,
                "No segment requests for 10 minutes; killing continuous encoder"
            );
            // SIGKILL terminates a stopped process as well.
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Ok(ContinuousOutcome::InactiveTimeout);
        }

        let Some(transcoded) = segment::last_contiguous_segment(&req.output_dir, start_index)
        else {
            continue;
        };
        let ahead = transcoded as i64 - hb.segment as i64;

        match state {
            EncoderState::Encoding if ahead >= SUSPEND_AHEAD => {
                tracing::info!(
                    video = %req.video,
                    resolution = %req.resolution,
                    ahead,
                    "Suspending continuous encoder"
                );
                match process::suspend(pid) {
                    Ok(()) => state = EncoderState::Suspended,
                    Err(e) => tracing::warn!("Failed to suspend encoder: {e}"),
                }
            }
            EncoderState::Suspended if ahead < RESUME_AHEAD => {
                tracing::info!(
                    video = %req.video,
                    resolution = %req.resolution,
                    ahead,
                    "Resuming continuous encoder"
                );
                match process::resume(pid) {
                    Ok(()) => state = EncoderState::Encoding,
                    Err(e) => tracing::warn!("Failed to resume encoder: {e}"),
                }
            }
            _ => {}
        }
    }
}

/// Kill the continuous worker owning `output_dir`, if any.
///
/// Reads the descriptor, force-kills its pid when the process still exists,
/// and removes the descriptor. Returns the descriptor so the caller can
/// cancel the matching queued job.
pub fn kill_continuous(output_dir: &Path) -> Option<ContinuousLock> {
    let desc = ContinuousLock::read(output_dir)?;

    if process::is_alive(desc.pid) {
        if let Err(e) = process::force_kill(desc.pid) {
            tracing::warn!("Failed to kill continuous encoder pid {}: {e}", desc.pid);
        }
    }

    ContinuousLock::remove(output_dir);
    Some(desc)
}
