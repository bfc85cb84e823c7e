//! Preview playlist and segment route handlers.
//!
//! Previews are fully written by the preview encoder; these handlers only
//! read files, returning 404 while the encode has not completed.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use vf_core::VideoId;
use vf_db::models::Preview;

use crate::context::AppContext;
use crate::error::AppError;
use crate::routes::streaming::{segment_response, PLAYLIST_CONTENT_TYPE};

/// GET /preview/{video_id}/index.m3u8
pub async fn get_preview_playlist(
    State(ctx): State<AppContext>,
    Path(video_id): Path<i64>,
) -> Result<Response, AppError> {
    let preview = load_preview(&ctx, VideoId::from(video_id))?;
    let path = ctx.config.media.preview_dir(preview.id).join("index.m3u8");

    let content = std::fs::read_to_string(&path)
        .map_err(|_| vf_core::Error::not_found("preview playlist", video_id))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE)],
        content,
    )
        .into_response())
}

/// GET /preview/{video_id}/{segment}
pub async fn get_preview_segment(
    State(ctx): State<AppContext>,
    Path((video_id, segment)): Path<(i64, String)>,
) -> Result<Response, AppError> {
    if !valid_preview_segment(&segment) {
        return Err(vf_core::Error::Validation(format!(
            "invalid preview segment name: {segment}"
        ))
        .into());
    }

    let preview = load_preview(&ctx, VideoId::from(video_id))?;
    let path = ctx.config.media.preview_dir(preview.id).join(&segment);

    let bytes = std::fs::read(&path)
        .map_err(|_| vf_core::Error::not_found("preview segment", &segment))?;

    Ok(segment_response(&segment, bytes))
}

fn load_preview(ctx: &AppContext, video_id: VideoId) -> vf_core::Result<Preview> {
    let conn = vf_db::pool::get_conn(&ctx.db)?;
    vf_db::queries::previews::get_preview_by_video(&conn, video_id)?
        .ok_or_else(|| vf_core::Error::not_found("preview", video_id))
}

/// Preview directories only ever contain `init.mp4` and `preview_NNN.mp4`.
fn valid_preview_segment(name: &str) -> bool {
    if name == "init.mp4" {
        return true;
    }
    name.strip_prefix("preview_")
        .and_then(|rest| rest.strip_suffix(".mp4"))
        .is_some_and(|index| !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_segment_name_validation() {
        assert!(valid_preview_segment("init.mp4"));
        assert!(valid_preview_segment("preview_000.mp4"));
        assert!(valid_preview_segment("preview_042.mp4"));
        assert!(!valid_preview_segment("segment_000.mp4"));
        assert!(!valid_preview_segment("preview_.mp4"));
        assert!(!valid_preview_segment("../index.m3u8"));
        assert!(!valid_preview_segment("preview_00a.mp4"));
    }
}
