//! Catalog route handlers: list, register, destroy, preview retranscode.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use vf_core::{Resolution, VideoId};
use vf_db::models::Video;
use vf_db::queries::videos::NewVideo;

use crate::context::AppContext;
use crate::error::AppError;
use crate::post_upload;
use crate::scheduler;

/// All resolutions a transcode directory may exist for.
const LADDER: [Resolution; 4] = [
    Resolution::P480,
    Resolution::P720,
    Resolution::P1080,
    Resolution::P2160,
];

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct VideoDto {
    pub id: VideoId,
    pub title: String,
    pub description: String,
    pub category: String,
    pub kind: String,
    pub thumbnail_url: Option<String>,
    pub poster_url: Option<String>,
    pub duration_secs: Option<f64>,
    pub resolution: Option<String>,
    pub imdb_id: Option<String>,
    pub release_year: Option<i32>,
    pub is_transcoded: bool,
    pub created_at: String,
}

impl From<&Video> for VideoDto {
    fn from(v: &Video) -> Self {
        Self {
            id: v.id,
            title: v.title.clone(),
            description: v.description.clone(),
            category: v.category.clone(),
            kind: v.kind.clone(),
            thumbnail_url: v.thumbnail_url.clone(),
            poster_url: v.poster_url.clone(),
            duration_secs: v.duration_secs,
            resolution: v.resolution.clone(),
            imdb_id: v.imdb_id.clone(),
            release_year: v.release_year,
            is_transcoded: v.is_transcoded,
            created_at: v.created_at.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateVideoRequest {
    /// Source file path, relative to the media root or absolute.
    pub source_path: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub kind: String,
    pub imdb_id: Option<String>,
    pub release_year: Option<i32>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/videos
pub async fn list_videos(State(ctx): State<AppContext>) -> Result<Json<Vec<VideoDto>>, AppError> {
    let conn = vf_db::pool::get_conn(&ctx.db)?;
    let videos = vf_db::queries::videos::list_videos(&conn)?;
    Ok(Json(videos.iter().map(VideoDto::from).collect()))
}

/// POST /api/videos
///
/// Registers an uploaded source file and kicks off the post-upload pipeline
/// (metadata, probe, thumbnail, preview, playlist) in the background.
pub async fn create_video(
    State(ctx): State<AppContext>,
    Json(request): Json<CreateVideoRequest>,
) -> Result<Response, AppError> {
    if request.source_path.trim().is_empty() {
        return Err(vf_core::Error::Validation("source_path is required".into()).into());
    }

    let video = {
        let conn = vf_db::pool::get_conn(&ctx.db)?;
        vf_db::queries::videos::create_video(
            &conn,
            &NewVideo {
                title: request.title,
                description: request.description,
                category: request.category,
                kind: request.kind,
                source_path: request.source_path,
                imdb_id: request.imdb_id,
                release_year: request.release_year,
            },
        )?
    };

    let job_ctx = ctx.clone();
    let video_id = video.id;
    ctx.jobs
        .enqueue(format!("post_upload_{video_id}"), move |_cancel| async move {
            let report = post_upload::run_post_upload(&job_ctx, video_id).await;
            tracing::info!(video = %video_id, ?report, "Post-upload pipeline finished");
        });

    Ok((StatusCode::CREATED, Json(VideoDto::from(&video))).into_response())
}

/// DELETE /api/videos/{id}
///
/// Destroys the catalog row and every piece of derived media: running
/// continuous workers, transcode outputs, the synthesized playlist and
/// thumbnail, and the preview directory.
pub async fn delete_video(
    State(ctx): State<AppContext>,
    Path(video_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let video_id = VideoId::from(video_id);
    let conn = vf_db::pool::get_conn(&ctx.db)?;

    let video = vf_db::queries::videos::get_video(&conn, video_id)?
        .ok_or_else(|| vf_core::Error::not_found("video", video_id))?;

    // Stop any continuous workers before tearing their outputs away.
    for resolution in LADDER {
        let output_dir = ctx.config.media.transcode_dir(video_id, resolution);
        if output_dir.exists() {
            scheduler::kill_worker(&ctx, &output_dir);
        }
        ctx.heartbeat.clear(video_id, resolution);
    }
    ctx.playlists.invalidate(video_id);

    if let Some(preview) = vf_db::queries::previews::get_preview_by_video(&conn, video_id)? {
        remove_dir_logged(&ctx.config.media.preview_dir(preview.id));
    }
    remove_dir_logged(&ctx.config.media.video_transcode_dir(video_id));
    remove_dir_logged(&ctx.config.media.index_dir(video_id));

    vf_db::queries::videos::delete_video(&conn, video_id)?;
    tracing::info!(video = %video_id, title = %video.title, "Video deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/videos/{id}/preview/retranscode
///
/// Resets the preview state machine to `pending` and re-enqueues the
/// encode.
pub async fn retranscode_preview(
    State(ctx): State<AppContext>,
    Path(video_id): Path<i64>,
) -> Result<Response, AppError> {
    let video_id = VideoId::from(video_id);
    let conn = vf_db::pool::get_conn(&ctx.db)?;

    let video = vf_db::queries::videos::get_video(&conn, video_id)?
        .ok_or_else(|| vf_core::Error::not_found("video", video_id))?;
    let preview = vf_db::queries::previews::get_preview_by_video(&conn, video_id)?
        .ok_or_else(|| vf_core::Error::not_found("preview", video_id))?;

    vf_db::queries::previews::reset_preview(&conn, preview.id)?;
    let preview = vf_db::queries::previews::get_preview(&conn, preview.id)?
        .ok_or_else(|| vf_core::Error::not_found("preview", preview.id))?;
    drop(conn);

    post_upload::enqueue_preview_encode(&ctx, &preview, &video.source_path);

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "preview_id": preview.id, "status": preview.status })),
    )
        .into_response())
}

fn remove_dir_logged(dir: &std::path::Path) {
    if let Err(e) = std::fs::remove_dir_all(dir) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove {}: {e}", dir.display());
        }
    }
}
