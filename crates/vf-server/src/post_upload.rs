//! Post-upload processing pipeline.
//!
//! Runs in the background after a new video is registered: metadata fetch,
//! technical probe, thumbnail, preview parameters, and the kicked-off
//! preview/playlist jobs. Each step's failure is recorded in the returned
//! report without aborting the later steps — except the probe, whose output
//! the technical/thumbnail steps depend on.

use std::cmp::min;

use serde::Serialize;

use vf_av::preview::PreviewJob;
use vf_core::{PreviewId, PreviewStatus, VideoId};
use vf_db::models::Preview;

use crate::context::AppContext;
use crate::metadata;

/// Sources longer than this start their preview at 10% in.
const PREVIEW_OFFSET_THRESHOLD_SECS: f64 = 180.0;

/// Preview clips are at most two minutes.
const PREVIEW_MAX_DURATION_SECS: i64 = 120;

/// Outcome record of one post-upload run. Background workers never
/// propagate errors to a request; this is the only error surface.
#[derive(Debug, Clone, Serialize)]
pub struct PostUploadReport {
    pub video_id: VideoId,
    pub metadata_fetched: bool,
    pub metadata_error: Option<String>,
    pub probe_ok: bool,
    pub probe_error: Option<String>,
    pub thumbnail_generated: bool,
    pub thumbnail_error: Option<String>,
    pub preview_id: Option<PreviewId>,
    pub preview_created: bool,
    pub preview_error: Option<String>,
}

impl PostUploadReport {
    fn new(video_id: VideoId) -> Self {
        Self {
            video_id,
            metadata_fetched: false,
            metadata_error: None,
            probe_ok: false,
            probe_error: None,
            thumbnail_generated: false,
            thumbnail_error: None,
            preview_id: None,
            preview_created: false,
            preview_error: None,
        }
    }
}

/// Process a newly uploaded video.
pub async fn run_post_upload(ctx: &AppContext, video_id: VideoId) -> PostUploadReport {
    let mut report = PostUploadReport::new(video_id);

    let mut video = {
        let conn = match vf_db::pool::get_conn(&ctx.db) {
            Ok(c) => c,
            Err(e) => {
                report.probe_error = Some(e.to_string());
                return report;
            }
        };
        match vf_db::queries::videos::get_video(&conn, video_id) {
            Ok(Some(v)) => v,
            Ok(None) => {
                report.probe_error = Some(format!("video {video_id} not found"));
                return report;
            }
            Err(e) => {
                report.probe_error = Some(e.to_string());
                return report;
            }
        }
    };

    // 1. Catalog metadata from the external provider, saved progressively.
    if let (Some(client), Some(imdb_id)) = (ctx.metadata.as_ref(), video.imdb_id.clone()) {
        match client.fetch_title(&imdb_id).await {
            Ok(title) => {
                metadata::apply_to_video(&title, &mut video);
                if let Err(e) = save_catalog(ctx, &video) {
                    report.metadata_error = Some(e.to_string());
                } else {
                    report.metadata_fetched = true;
                    tracing::info!(video = %video_id, title = %video.title, "Metadata fetched");
                }
            }
            Err(e) => {
                tracing::warn!(video = %video_id, error = %e, "Metadata fetch failed");
                report.metadata_error = Some(e.to_string());
            }
        }
    }

    // 2. Probe for technical facts. On failure the technical and thumbnail
    // steps are skipped, but a preview with default parameters is still
    // attempted.
    let source = ctx.config.media.resolve_source(&video.source_path);
    let mut duration_secs: Option<f64> = None;

    match vf_av::probe::probe(&ctx.tools, &source).await {
        Ok(info) => {
            if let Some(ref codec) = info.video_codec {
                video.video_codec = Some(codec.clone());
            }
            if let Some(ref codec) = info.audio_codec {
                video.audio_codec = Some(codec.clone());
            }
            if let Some(res) = info.resolution() {
                video.resolution = Some(res);
            }
            if let Some(kbps) = info.bitrate_kbps {
                video.bitrate_kbps = Some(kbps as i64);
            }
            if let Some(kbps) = info.audio_bitrate_kbps {
                video.audio_bitrate_kbps = Some(kbps as i64);
            }
            if let Some(d) = info.duration_seconds {
                video.duration_secs = Some(d);
                duration_secs = Some(d);
            }

            match save_technical(ctx, &video) {
                Ok(()) => {
                    report.probe_ok = true;
                    tracing::info!(video = %video_id, ?info, "Probe complete");
                }
                Err(e) => report.probe_error = Some(e.to_string()),
            }
        }
        Err(e) => {
            tracing::warn!(video = %video_id, error = %e, "Probe failed");
            report.probe_error = Some(e.to_string());
        }
    }

    // 3. Thumbnail at one tenth of the duration, unless one is already set.
    if report.probe_ok && metadata_missing(&video.thumbnail_url) {
        let at = duration_secs.unwrap_or(0.0) / 10.0;
        let thumb_path = ctx.config.media.thumbnail_path(video_id);

        match vf_av::thumbnail::extract_thumbnail(&ctx.tools, &source, &thumb_path, at).await {
            Ok(()) => {
                let url = ctx.config.media.thumbnail_url(video_id);
                video.poster_url = Some(url.clone());
                video.thumbnail_url = Some(url);
                match save_catalog(ctx, &video) {
                    Ok(()) => report.thumbnail_generated = true,
                    Err(e) => report.thumbnail_error = Some(e.to_string()),
                }
            }
            Err(e) => {
                tracing::warn!(video = %video_id, error = %e, "Thumbnail generation failed");
                report.thumbnail_error = Some(e.to_string());
            }
        }
    }

    // 4. Preview parameters, preview row, and the background encodes.
    let (start_offset, preview_duration) = preview_params(duration_secs);

    let preview = {
        let conn = match vf_db::pool::get_conn(&ctx.db) {
            Ok(c) => c,
            Err(e) => {
                report.preview_error = Some(e.to_string());
                return report;
            }
        };
        vf_db::queries::previews::get_or_create_preview(
            &conn,
            video_id,
            start_offset,
            preview_duration,
        )
    };

    match preview {
        Ok((preview, created)) => {
            report.preview_id = Some(preview.id);
            report.preview_created = created;
            enqueue_preview_encode(ctx, &preview, &video.source_path);
            enqueue_playlist_synthesis(ctx, video_id, &video.source_path);
        }
        Err(e) => report.preview_error = Some(e.to_string()),
    }

    report
}

/// Preview window: start at 10% for sources over three minutes, and cap the
/// clip at two minutes (or the whole source when shorter).
pub fn preview_params(duration_secs: Option<f64>) -> (i64, i64) {
    let duration = duration_secs.unwrap_or(0.0);

    let start_offset = if duration > PREVIEW_OFFSET_THRESHOLD_SECS {
        (duration * 0.1) as i64
    } else {
        0
    };

    let preview_duration = if duration > 0.0 {
        min(PREVIEW_MAX_DURATION_SECS, duration as i64)
    } else {
        PREVIEW_MAX_DURATION_SECS
    };

    (start_offset, preview_duration)
}

// ---------------------------------------------------------------------------
// Background jobs
// ---------------------------------------------------------------------------

/// Enqueue the preview encode job, driving the preview state machine.
pub fn enqueue_preview_encode(ctx: &AppContext, preview: &Preview, source_path: &str) {
    let job_id = format!("preview_{}", preview.id);
    let ctx = ctx.clone();
    let preview_id = preview.id;
    let job = PreviewJob {
        input: ctx.config.media.resolve_source(source_path),
        output_dir: ctx.config.media.preview_dir(preview_id),
        start_offset: preview.start_offset.max(0) as u32,
        duration: preview.preview_duration.clamp(0, 120) as u32,
    };

    ctx.jobs.clone().enqueue(job_id, move |_cancel| async move {
        run_preview_encode(&ctx, preview_id, job).await;
    });
}

async fn run_preview_encode(ctx: &AppContext, preview_id: PreviewId, job: PreviewJob) {
    let set_status = |status: PreviewStatus, error: Option<String>| {
        let conn = vf_db::pool::get_conn(&ctx.db)?;
        vf_db::queries::previews::set_preview_status(&conn, preview_id, status, error.as_deref())
    };

    if let Err(e) = set_status(PreviewStatus::Processing, None) {
        tracing::error!(preview = %preview_id, error = %e, "Failed to mark preview processing");
        return;
    }

    match vf_av::preview::encode_preview(&ctx.tools, &ctx.locks, &job).await {
        Ok(()) => {
            tracing::info!(preview = %preview_id, "Preview encode completed");
            if let Err(e) = set_status(PreviewStatus::Completed, None) {
                tracing::error!(preview = %preview_id, error = %e, "Failed to mark preview completed");
            }
        }
        Err(e) => {
            tracing::warn!(preview = %preview_id, error = %e, "Preview encode failed");
            if let Err(e) = set_status(PreviewStatus::Failed, Some(e.to_string())) {
                tracing::error!(preview = %preview_id, error = %e, "Failed to mark preview failed");
            }
        }
    }
}

/// Enqueue a one-off playlist synthesis so the first player request finds
/// the index already on disk.
fn enqueue_playlist_synthesis(ctx: &AppContext, video_id: VideoId, source_path: &str) {
    let job_id = format!("playlist_video{video_id}");
    let tools = ctx.tools.clone();
    let locks = ctx.locks.clone();
    let source = ctx.config.media.resolve_source(source_path);
    let m3u8_path = ctx.config.media.playlist_path(video_id);

    ctx.jobs.clone().enqueue(job_id, move |_cancel| async move {
        match vf_av::playlist::synthesize(&tools, &locks, &source, &m3u8_path, false).await {
            Ok(_) => tracing::info!(video = %video_id, "Playlist synthesized"),
            Err(vf_core::Error::Busy(_)) => {
                tracing::debug!(video = %video_id, "Playlist synthesis already in progress")
            }
            Err(e) => tracing::warn!(video = %video_id, error = %e, "Playlist synthesis failed"),
        }
    });
}

fn save_catalog(ctx: &AppContext, video: &vf_db::models::Video) -> vf_core::Result<()> {
    let conn = vf_db::pool::get_conn(&ctx.db)?;
    vf_db::queries::videos::update_catalog_fields(&conn, video)
}

fn save_technical(ctx: &AppContext, video: &vf_db::models::Video) -> vf_core::Result<()> {
    let conn = vf_db::pool::get_conn(&ctx.db)?;
    vf_db::queries::videos::update_technical_fields(&conn, video)
}

fn metadata_missing(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.is_empty())
}
