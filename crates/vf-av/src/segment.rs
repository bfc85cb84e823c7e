//! One-shot encoding of single media segments and the init segment.
//!
//! This is the interactive hot path: a player asked for a segment that is
//! not on disk yet, so the encode window is kept narrow (two thirds of the
//! segment duration) and must start within about a second.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use vf_core::VideoCodec;

use crate::command::ToolCommand;
use crate::locks::LockRegistry;
use crate::tools::ToolRegistry;

/// Hard limit for a single segment encode.
pub const ENCODE_TIMEOUT: Duration = Duration::from_secs(300);

/// Upper bound when scanning an output directory for produced segments.
const SEGMENT_SCAN_LIMIT: u64 = 1000;

/// Audio handling for an encode: pass through or re-encode to AAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioMode {
    /// Source audio is already the target codec; copy the stream.
    Copy,
    /// Re-encode to AAC at 48 kHz.
    Aac,
}

impl AudioMode {
    /// Value for ffmpeg's `-c:a`.
    pub fn codec_arg(&self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Aac => "aac",
        }
    }
}

/// Encoder parameters derived by the scheduler from the resolution ladder
/// and the source probe.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeParams {
    /// ffmpeg scale filter, e.g. `scale=-2:720`.
    pub scale: String,
    /// Target video codec family.
    pub codec: VideoCodec,
    /// Target video bitrate, e.g. `2500k`.
    pub bitrate: String,
    /// Audio handling.
    pub audio: AudioMode,
    /// Segment duration in seconds (from the playlist EXTINF).
    pub segment_duration: f64,
}

// ---------------------------------------------------------------------------
// Segment naming
// ---------------------------------------------------------------------------

/// Parse the numeric index out of `segment_NNN.mp4`.
pub fn segment_index(name: &str) -> Option<u64> {
    name.strip_prefix("segment_")?
        .strip_suffix(".mp4")?
        .parse()
        .ok()
}

/// File name for a segment index (`segment_005.mp4`).
pub fn segment_file_name(index: u64) -> String {
    format!("segment_{index:03}.mp4")
}

/// Largest index `t` such that segments `start..=t` all exist in `dir`.
///
/// Returns `None` when the starting segment itself is missing.
pub fn last_contiguous_segment(dir: &Path, start: u64) -> Option<u64> {
    let mut last = None;
    for i in start..start + SEGMENT_SCAN_LIMIT {
        if dir.join(segment_file_name(i)).exists() {
            last = Some(i);
        } else {
            break;
        }
    }
    last
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Produce the fMP4 initialization segment (`init.mp4`).
pub async fn encode_init(
    tools: &ToolRegistry,
    locks: &LockRegistry,
    input: &Path,
    output_dir: &Path,
    params: &EncodeParams,
) -> vf_core::Result<()> {
    let output = output_dir.join("init.mp4");
    let ffmpeg = tools.require("ffmpeg")?;
    std::fs::create_dir_all(output_dir)?;

    let lockfile = lockfile_for(&output);
    if !locks.try_acquire(&lockfile)? {
        return Err(vf_core::Error::Busy("init segment encode in progress".into()));
    }

    let mut cmd = ToolCommand::new(ffmpeg.path.clone());
    cmd.timeout(ENCODE_TIMEOUT);
    cmd.args(["-y", "-i"]);
    cmd.arg(input.to_string_lossy().as_ref());
    cmd.args(["-vf", params.scale.as_str()]);
    cmd.args(["-c:v", params.codec.encoder()]);
    cmd.args(["-preset", "fast"]);
    cmd.args(["-b:v", params.bitrate.as_str()]);
    cmd.args(["-c:a", params.audio.codec_arg()]);
    cmd.args(["-ar", "48000"]);
    // Zero-duration output: only the initialization payload is written.
    cmd.args(["-t", "0", "-f", "mp4"]);
    cmd.args(["-fflags", "+genpts"]);
    cmd.args(["-movflags", "+faststart+frag_keyframe+empty_moov+default_base_moof"]);
    cmd.arg(output.to_string_lossy().as_ref());

    let result = run_encode(&cmd).await;
    locks.release(&lockfile);
    result
}

/// Produce one media segment (`segment_NNN.mp4`) by seeking into the source.
pub async fn encode_segment(
    tools: &ToolRegistry,
    locks: &LockRegistry,
    input: &Path,
    output_dir: &Path,
    segment_name: &str,
    params: &EncodeParams,
) -> vf_core::Result<()> {
    let index = segment_index(segment_name).ok_or_else(|| {
        vf_core::Error::Validation(format!("invalid segment name: {segment_name}"))
    })?;

    let output = output_dir.join(segment_name);
    let ffmpeg = tools.require("ffmpeg")?;
    std::fs::create_dir_all(output_dir)?;

    let lockfile = lockfile_for(&output);
    if !locks.try_acquire(&lockfile)? {
        return Err(vf_core::Error::Busy(format!(
            "segment {segment_name} encode in progress"
        )));
    }

    let delta = params.segment_duration;
    let start = delta * index as f64;
    // The narrow window: encode two thirds of the segment span, with a
    // keyframe forced at every third.
    let end = start + delta / 3.0 * 2.0;

    let mut cmd = ToolCommand::new(ffmpeg.path.clone());
    cmd.timeout(ENCODE_TIMEOUT);
    cmd.args(["-y", "-ss"]);
    cmd.arg(format!("{start}"));
    cmd.arg("-to");
    cmd.arg(format!("{end}"));
    cmd.arg("-i");
    cmd.arg(input.to_string_lossy().as_ref());
    cmd.args(["-vf", params.scale.as_str()]);
    cmd.args(["-c:v", params.codec.encoder()]);
    cmd.args(["-preset", "medium"]);
    cmd.args(["-b:v", params.bitrate.as_str()]);
    cmd.args(["-c:a", params.audio.codec_arg()]);
    cmd.args(["-ar", "48000"]);
    cmd.args(["-movflags", "+empty_moov+default_base_moof"]);
    cmd.arg("-force_key_frames");
    cmd.arg(format!("expr:gte(t,n_forced*{})", delta / 3.0));
    cmd.args(["-reset_timestamps", "0"]);
    cmd.args(["-fflags", "+genpts"]);
    cmd.arg(output.to_string_lossy().as_ref());

    tracing::debug!(
        segment = segment_name,
        start,
        end,
        bitrate = %params.bitrate,
        "Encoding single segment"
    );

    let result = run_encode(&cmd).await;
    locks.release(&lockfile);
    result
}

async fn run_encode(cmd: &ToolCommand) -> vf_core::Result<()> {
    let output = cmd.capture().await?;
    if !output.status.success() {
        return Err(vf_core::Error::encode(output.stderr));
    }
    Ok(())
}

fn lockfile_for(output: &Path) -> PathBuf {
    let mut os = output.as_os_str().to_os_string();
    os.push(".lock");
    PathBuf::from(os)
}

// ---------------------------------------------------------------------------
// File stability
// ---------------------------------------------------------------------------

/// Wait until `path` exists with a non-empty size that has not changed for
/// `stable_for`. Returns `false` on timeout.
///
/// Used when a request attaches to an already-running worker and must wait
/// for ffmpeg to finish writing the requested segment.
pub async fn wait_for_stable_file(path: &Path, timeout: Duration, stable_for: Duration) -> bool {
    let start = Instant::now();
    let mut last_size: u64 = 0;
    let mut stable_since: Option<Instant> = None;

    while start.elapsed() < timeout {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > 0 => {
                let size = meta.len();
                if size == last_size {
                    match stable_since {
                        Some(since) if since.elapsed() >= stable_for => return true,
                        Some(_) => {}
                        None => stable_since = Some(Instant::now()),
                    }
                } else {
                    stable_since = None;
                    last_size = size;
                }
            }
            _ => {
                stable_since = None;
                last_size = 0;
            }
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    false
}
