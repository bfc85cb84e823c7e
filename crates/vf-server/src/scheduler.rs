//! Transcode scheduling: the decision layer between HTTP handlers and the
//! encoders.
//!
//! Two entry points mirror the two player-facing requests:
//!
//! - [`serve_playlist`]: heartbeat reset, playlist synthesis (cached), and
//!   an idempotent continuous-encoder enqueue at segment zero.
//! - [`serve_segment`]: heartbeat update, cache hit or encode-on-demand,
//!   with the seek-past-window and same-user override rules deciding when a
//!   running continuous worker must die first.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use vf_av::locks::ContinuousLock;
use vf_av::segment::{self, AudioMode, EncodeParams};
use vf_av::{continuous, playlist, ContinuousRequest};
use vf_core::{Resolution, VideoCodec, VideoId};
use vf_db::models::Video;

use crate::context::AppContext;

/// Poll period while waiting for a segment file to appear.
const SEGMENT_POLL: Duration = Duration::from_secs(2);

/// How long a handler waits for a segment before giving up.
const SEGMENT_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// A segment is complete once its size is unchanged for this long.
const SEGMENT_STABLE_FOR: Duration = Duration::from_secs(2);

/// Fallback segment duration when the playlist is unavailable.
const DEFAULT_SEGMENT_DURATION: f64 = 5.0;

// ---------------------------------------------------------------------------
// Worker identity
// ---------------------------------------------------------------------------

/// Per-user-per-resolution worker id.
pub fn worker_id(user: &str, resolution: Resolution) -> String {
    format!("{user}_{resolution}")
}

/// Job id of the continuous worker for one `(user, video, resolution)`.
///
/// Deterministic so that enqueueing twice under the same identity is a
/// no-op, while one user can still run workers for several outputs.
pub fn continuous_job_id(user: &str, video: VideoId, resolution: Resolution) -> String {
    format!("{}_video{video}_{resolution}", worker_id(user, resolution))
}

/// Whether a descriptor's worker id belongs to `user`'s id scheme.
fn belongs_to_user(
    descriptor: &ContinuousLock,
    user: &str,
    video: VideoId,
    resolution: Resolution,
) -> bool {
    let Some(ref existing) = descriptor.worker_id else {
        return false;
    };
    let wid = worker_id(user, resolution);
    *existing == continuous_job_id(user, video, resolution)
        || existing.starts_with(&format!("{wid}_"))
        || *existing == wid
}

// ---------------------------------------------------------------------------
// serve_playlist
// ---------------------------------------------------------------------------

/// Serve the playlist for `(video, resolution)` and kick off prefetching.
///
/// The continuous encoder is enqueued regardless of the synthesis outcome so
/// that a contended playlist request still warms the segment cache.
pub async fn serve_playlist(
    ctx: &AppContext,
    video_id: VideoId,
    resolution: Resolution,
    user: &str,
    force: bool,
) -> vf_core::Result<String> {
    let video = load_video(ctx, video_id)?;
    // The resolution must be a valid transcode target before any work starts.
    let params = derive_params(ctx, &video, resolution, "segment_000.mp4", None)?;

    ctx.heartbeat.set(video_id, resolution, 0);

    let playlist = playlist_content(ctx, &video, force).await;

    enqueue_continuous(ctx, &video, resolution, user, "segment_000.mp4", params).await;

    playlist
}

async fn playlist_content(
    ctx: &AppContext,
    video: &Video,
    force: bool,
) -> vf_core::Result<String> {
    if !force {
        if let Some(cached) = ctx.playlists.get(video.id) {
            return Ok(cached);
        }
    } else {
        ctx.playlists.invalidate(video.id);
    }

    let source = ctx.config.media.resolve_source(&video.source_path);
    let m3u8_path = ctx.config.media.playlist_path(video.id);

    let content = playlist::synthesize(&ctx.tools, &ctx.locks, &source, &m3u8_path, force).await?;
    ctx.playlists.insert(video.id, content.clone());
    Ok(content)
}

/// Enqueue the continuous worker, or wait on the requested segment when the
/// same job id is already running.
async fn enqueue_continuous(
    ctx: &AppContext,
    video: &Video,
    resolution: Resolution,
    user: &str,
    start_segment: &str,
    params: EncodeParams,
) {
    let job_id = continuous_job_id(user, video.id, resolution);
    let output_dir = ctx.config.media.transcode_dir(video.id, resolution);

    let request = ContinuousRequest {
        video: video.id,
        resolution,
        input: ctx.config.media.resolve_source(&video.source_path),
        output_dir: output_dir.clone(),
        start_segment: start_segment.to_string(),
        params,
        worker_id: Some(job_id.clone()),
    };

    let tools = ctx.tools.clone();
    let heartbeat = ctx.heartbeat.clone();
    let worker_job_id = job_id.clone();

    let enqueued = ctx.jobs.enqueue(&job_id, move |cancel| async move {
        match continuous::run_continuous(&tools, &request, heartbeat, cancel).await {
            Ok(outcome) => {
                tracing::info!(job_id = %worker_job_id, ?outcome, "Continuous worker finished")
            }
            Err(e) => tracing::error!(job_id = %worker_job_id, error = %e, "Continuous worker failed"),
        }
    });

    if !enqueued {
        // Same id already running: wait for the requested segment to settle
        // instead of spawning a second writer.
        tracing::debug!(job_id = %job_id, "Continuous worker already enqueued; waiting");
        segment::wait_for_stable_file(
            &output_dir.join(start_segment),
            SEGMENT_WAIT_TIMEOUT,
            SEGMENT_STABLE_FOR,
        )
        .await;
    }
}

// ---------------------------------------------------------------------------
// serve_segment
// ---------------------------------------------------------------------------

/// Serve a media segment, encoding it on demand when missing.
pub async fn serve_segment(
    ctx: &AppContext,
    video_id: VideoId,
    resolution: Resolution,
    segment_name: &str,
    user: &str,
    requested_bitrate: Option<&str>,
) -> vf_core::Result<Vec<u8>> {
    let video = load_video(ctx, video_id)?;
    let params = derive_params(ctx, &video, resolution, segment_name, requested_bitrate)?;

    let source = ctx.config.media.resolve_source(&video.source_path);
    let output_dir = ctx.config.media.transcode_dir(video_id, resolution);
    let path = output_dir.join(segment_name);

    if segment_name == "init.mp4" {
        if !path.exists() {
            match segment::encode_init(&ctx.tools, &ctx.locks, &source, &output_dir, &params).await
            {
                Ok(()) | Err(vf_core::Error::Busy(_)) => {}
                Err(e) => return Err(e),
            }
            await_file(&path, segment_name).await?;
        }
        return Ok(std::fs::read(&path)?);
    }

    let index = segment::segment_index(segment_name).ok_or_else(|| {
        vf_core::Error::Validation(format!("invalid segment name: {segment_name}"))
    })?;
    ctx.heartbeat.set(video_id, resolution, index);

    if path.exists() {
        return Ok(std::fs::read(&path)?);
    }

    // Seek past the prefetched window: the throttled continuous worker can
    // never catch up, so it loses unconditionally.
    let last_contiguous = segment::last_contiguous_segment(&output_dir, 0);
    let window_end = last_contiguous.map(|t| t + 1).unwrap_or(0);
    if index > window_end {
        tracing::info!(
            video = %video_id,
            resolution = %resolution,
            requested = index,
            window_end,
            "Seek beyond prefetched window; killing continuous worker"
        );
        kill_worker(ctx, &output_dir);
    } else if index == window_end {
        // The next segment in line: a live continuous worker is about to
        // write exactly this file, so poll for it before preempting.
        if let Some(descriptor) = ContinuousLock::read(&output_dir) {
            if vf_av::process::is_alive(descriptor.pid)
                && segment::wait_for_stable_file(&path, SEGMENT_WAIT_TIMEOUT, SEGMENT_STABLE_FOR)
                    .await
            {
                return Ok(std::fs::read(&path)?);
            }
        }
    }

    if let Some(descriptor) = ContinuousLock::read(&output_dir) {
        // A single-segment job preempts an existing continuous worker only
        // when it belongs to the same user; other viewers keep theirs.
        if belongs_to_user(&descriptor, user, video_id, resolution) {
            tracing::info!(
                video = %video_id,
                resolution = %resolution,
                worker = ?descriptor.worker_id,
                "Preempting own continuous worker for single-segment encode"
            );
            kill_worker(ctx, &output_dir);
        }
    }

    match segment::encode_segment(&ctx.tools, &ctx.locks, &source, &output_dir, segment_name, &params)
        .await
    {
        Ok(()) => {}
        // Another writer is already producing this segment; fall through to
        // the polling wait.
        Err(vf_core::Error::Busy(_)) => {}
        Err(e) => return Err(e),
    }

    await_file(&path, segment_name).await?;
    Ok(std::fs::read(&path)?)
}

/// Kill the continuous worker owning `output_dir` and cancel its queued job.
pub fn kill_worker(ctx: &AppContext, output_dir: &Path) {
    if let Some(descriptor) = continuous::kill_continuous(output_dir) {
        if let Some(ref job_id) = descriptor.worker_id {
            ctx.jobs.cancel(job_id);
        }
    }
}

/// Poll until `path` exists, failing with `NotFound` on timeout.
async fn await_file(path: &PathBuf, segment_name: &str) -> vf_core::Result<()> {
    let start = Instant::now();
    while !path.exists() {
        if start.elapsed() >= SEGMENT_WAIT_TIMEOUT {
            return Err(vf_core::Error::not_found("segment", segment_name));
        }
        tokio::time::sleep(SEGMENT_POLL).await;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Parameter derivation
// ---------------------------------------------------------------------------

/// Derive encoder parameters from the ladder, the source probe, and the
/// playlist's advertised segment duration.
pub fn derive_params(
    ctx: &AppContext,
    video: &Video,
    resolution: Resolution,
    segment_name: &str,
    requested_bitrate: Option<&str>,
) -> vf_core::Result<EncodeParams> {
    let target_height = resolution.height();
    let default_kbps = resolution.default_bitrate_kbps().ok_or_else(|| {
        vf_core::Error::Validation(format!("unsupported resolution: {resolution}"))
    })?;

    let codec = VideoCodec::H264;
    let mut scale = format!("scale=-2:{target_height}");
    let mut bitrate = match requested_bitrate {
        Some(raw) => vf_core::media::validate_bitrate(codec, resolution, raw)?,
        None => format!("{default_kbps}k"),
    };

    // Never upscale: clamp to the source height and back the bitrate off to
    // 80% of the source's, when known.
    if let Some(source_height) = video.source_height() {
        if source_height < target_height {
            scale = format!("scale=-2:{source_height}");
            if let Some(source_kbps) = video.bitrate_kbps {
                bitrate = format!("{}k", (source_kbps as f64 * 0.8) as u64);
            }
        }
    }

    let audio = if video.audio_codec.as_deref() == Some("aac") {
        AudioMode::Copy
    } else {
        AudioMode::Aac
    };

    Ok(EncodeParams {
        scale,
        codec,
        bitrate,
        audio,
        segment_duration: segment_duration_for(ctx, video.id, segment_name),
    })
}

/// Segment duration from the playlist's `EXTINF`, defaulting to 5 s.
///
/// Durations vary segment to segment because they reflect keyframe spacing.
fn segment_duration_for(ctx: &AppContext, video_id: VideoId, segment_name: &str) -> f64 {
    let text = ctx.playlists.get(video_id).or_else(|| {
        std::fs::read_to_string(ctx.config.media.playlist_path(video_id)).ok()
    });

    text.and_then(|t| playlist::extinf_for(&t, segment_name))
        .unwrap_or(DEFAULT_SEGMENT_DURATION)
}

fn load_video(ctx: &AppContext, video_id: VideoId) -> vf_core::Result<Video> {
    let conn = vf_db::pool::get_conn(&ctx.db)?;
    vf_db::queries::videos::get_video(&conn, video_id)?
        .ok_or_else(|| vf_core::Error::not_found("video", video_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vf_core::config::Config;
    use vf_db::queries::videos::{create_video, NewVideo};

    fn harness() -> (AppContext, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.media.root = dir.path().to_path_buf();
        let db = vf_db::pool::init_memory_pool().unwrap();
        (AppContext::new(db, config), dir)
    }

    fn seed_video(ctx: &AppContext) -> Video {
        let conn = vf_db::pool::get_conn(&ctx.db).unwrap();
        let mut video = create_video(
            &conn,
            &NewVideo {
                title: "test".into(),
                source_path: "videos/test.mp4".into(),
                ..Default::default()
            },
        )
        .unwrap();
        video.resolution = Some("1920x1080".into());
        video.audio_codec = Some("aac".into());
        video.bitrate_kbps = Some(4000);
        vf_db::queries::videos::update_technical_fields(&conn, &video).unwrap();
        vf_db::queries::videos::get_video(&conn, video.id).unwrap().unwrap()
    }

    #[test]
    fn worker_and_job_ids_are_deterministic() {
        let video = VideoId::from(7);
        assert_eq!(worker_id("alice", Resolution::P720), "alice_720p");
        assert_eq!(
            continuous_job_id("alice", video, Resolution::P720),
            "alice_720p_video7_720p"
        );
    }

    #[test]
    fn same_user_override_matches_descriptor() {
        let video = VideoId::from(7);
        let descriptor = ContinuousLock {
            pid: 1,
            worker_id: Some("alice_720p_video7_720p".into()),
        };
        assert!(belongs_to_user(&descriptor, "alice", video, Resolution::P720));
        assert!(!belongs_to_user(&descriptor, "bob", video, Resolution::P720));

        let anonymous = ContinuousLock {
            pid: 1,
            worker_id: None,
        };
        assert!(!belongs_to_user(&anonymous, "alice", video, Resolution::P720));
    }

    #[test]
    fn params_default_ladder() {
        let (ctx, _dir) = harness();
        let video = seed_video(&ctx);

        let params = derive_params(&ctx, &video, Resolution::P720, "segment_000.mp4", None).unwrap();
        assert_eq!(params.scale, "scale=-2:720");
        assert_eq!(params.bitrate, "2500k");
        assert_eq!(params.audio, AudioMode::Copy);
        assert_eq!(params.codec, VideoCodec::H264);
        // No playlist on disk: fallback duration.
        assert_eq!(params.segment_duration, DEFAULT_SEGMENT_DURATION);
    }

    #[test]
    fn params_clamp_to_source_height() {
        let (ctx, _dir) = harness();
        let mut video = seed_video(&ctx);
        video.resolution = Some("1280x720".into());
        video.bitrate_kbps = Some(3000);

        let params =
            derive_params(&ctx, &video, Resolution::P2160, "segment_000.mp4", None).unwrap();
        assert_eq!(params.scale, "scale=-2:720");
        // 80% of the source bitrate.
        assert_eq!(params.bitrate, "2400k");
    }

    #[test]
    fn params_respect_requested_bitrate() {
        let (ctx, _dir) = harness();
        let video = seed_video(&ctx);

        let params =
            derive_params(&ctx, &video, Resolution::P720, "segment_000.mp4", Some("3500k"))
                .unwrap();
        assert_eq!(params.bitrate, "3500k");

        let err =
            derive_params(&ctx, &video, Resolution::P720, "segment_000.mp4", Some("9999k"));
        assert!(err.is_err());
    }

    #[test]
    fn params_reject_360p_target() {
        let (ctx, _dir) = harness();
        let video = seed_video(&ctx);
        let err = derive_params(&ctx, &video, Resolution::P360, "segment_000.mp4", None);
        assert!(matches!(err, Err(vf_core::Error::Validation(_))));
    }

    #[test]
    fn params_reencode_audio_for_non_aac_source() {
        let (ctx, _dir) = harness();
        let mut video = seed_video(&ctx);
        video.audio_codec = Some("ac3".into());
        let params = derive_params(&ctx, &video, Resolution::P480, "segment_000.mp4", None).unwrap();
        assert_eq!(params.audio, AudioMode::Aac);
    }

    #[test]
    fn segment_duration_from_playlist_file() {
        let (ctx, _dir) = harness();
        let video = seed_video(&ctx);

        let m3u8 = ctx.config.media.playlist_path(video.id);
        std::fs::create_dir_all(m3u8.parent().unwrap()).unwrap();
        std::fs::write(
            &m3u8,
            "#EXTM3U\n#EXT-X-DISCONTINUITY\n#EXTINF:6.255,\nsegment_000.mp4\n",
        )
        .unwrap();

        let d = segment_duration_for(&ctx, video.id, "segment_000.mp4");
        assert!((d - 6.255).abs() < 1e-9);
        assert_eq!(
            segment_duration_for(&ctx, video.id, "segment_042.mp4"),
            DEFAULT_SEGMENT_DURATION
        );
    }

    #[tokio::test]
    async fn serve_segment_hits_existing_file_and_sets_heartbeat() {
        let (ctx, _dir) = harness();
        let video = seed_video(&ctx);

        let output_dir = ctx.config.media.transcode_dir(video.id, Resolution::P720);
        std::fs::create_dir_all(&output_dir).unwrap();
        std::fs::write(output_dir.join("segment_005.mp4"), b"fmp4-bytes").unwrap();

        let bytes = serve_segment(&ctx, video.id, Resolution::P720, "segment_005.mp4", "alice", None)
            .await
            .unwrap();
        assert_eq!(bytes, b"fmp4-bytes");

        let hb = ctx.heartbeat.get(video.id, Resolution::P720).unwrap();
        assert_eq!(hb.segment, 5);
    }

    #[tokio::test]
    async fn serve_segment_unknown_video_is_404() {
        let (ctx, _dir) = harness();
        let err = serve_segment(
            &ctx,
            VideoId::from(999),
            Resolution::P720,
            "segment_000.mp4",
            "alice",
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, vf_core::Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn serve_segment_rejects_bad_name() {
        let (ctx, _dir) = harness();
        let video = seed_video(&ctx);
        let err = serve_segment(&ctx, video.id, Resolution::P720, "../etc/passwd", "alice", None)
            .await
            .unwrap_err();
        assert!(matches!(err, vf_core::Error::Validation(_)));
    }

    #[tokio::test]
    async fn seek_past_window_kills_descriptor() {
        let (ctx, _dir) = harness();
        let video = seed_video(&ctx);

        let output_dir = ctx.config.media.transcode_dir(video.id, Resolution::P720);
        std::fs::create_dir_all(&output_dir).unwrap();
        // Worker produced segments 0..=2; a dead pid stands in for it.
        for i in 0..3u64 {
            std::fs::write(output_dir.join(segment::segment_file_name(i)), b"x").unwrap();
        }
        ContinuousLock {
            pid: 99_999_999,
            worker_id: Some("bob_720p_video1_720p".into()),
        }
        .write(&output_dir)
        .unwrap();

        // Requested far beyond the window; the descriptor must be consumed
        // even though the single-segment encode itself fails (no ffmpeg).
        let result = serve_segment(
            &ctx,
            video.id,
            Resolution::P720,
            "segment_120.mp4",
            "alice",
            None,
        )
        .await;
        assert!(result.is_err());
        assert!(ContinuousLock::read(&output_dir).is_none());
    }

    #[tokio::test]
    async fn adjacent_request_spares_other_users_worker() {
        let (ctx, _dir) = harness();
        let video = seed_video(&ctx);

        let output_dir = ctx.config.media.transcode_dir(video.id, Resolution::P720);
        std::fs::create_dir_all(&output_dir).unwrap();
        std::fs::write(output_dir.join("segment_000.mp4"), b"x").unwrap();
        let descriptor = ContinuousLock {
            pid: 99_999_999,
            worker_id: Some(continuous_job_id("bob", video.id, Resolution::P720)),
        };
        descriptor.write(&output_dir).unwrap();

        // segment_001 is within the window (last contiguous is 0), so no
        // unconditional kill; and it's bob's worker, so alice spares it.
        let result = serve_segment(
            &ctx,
            video.id,
            Resolution::P720,
            "segment_001.mp4",
            "alice",
            None,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(ContinuousLock::read(&output_dir), Some(descriptor));
    }
}
