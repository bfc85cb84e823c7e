//! Public thumbnail serving.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use vf_core::VideoId;

use crate::context::AppContext;
use crate::error::AppError;

/// GET /thumbnail/{video_dir}/thumbnail.jpg
///
/// The path segment is the on-disk directory name (`video_<id>`), matching
/// the URL written into catalog rows.
pub async fn get_thumbnail(
    State(ctx): State<AppContext>,
    Path(video_dir): Path<String>,
) -> Result<Response, AppError> {
    let video_id = parse_video_dir(&video_dir).ok_or_else(|| {
        vf_core::Error::Validation(format!("invalid thumbnail path: {video_dir}"))
    })?;

    let path = ctx.config.media.thumbnail_path(video_id);
    let bytes = std::fs::read(&path)
        .map_err(|_| vf_core::Error::not_found("thumbnail", video_id))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/jpeg".to_string()),
            (
                header::CONTENT_DISPOSITION,
                "inline; filename=\"thumbnail.jpg\"".to_string(),
            ),
        ],
        bytes,
    )
        .into_response())
}

fn parse_video_dir(dir: &str) -> Option<VideoId> {
    dir.strip_prefix("video_")?.parse::<i64>().ok().map(VideoId::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_dir_parsing() {
        assert_eq!(parse_video_dir("video_7"), Some(VideoId::from(7)));
        assert_eq!(parse_video_dir("video_"), None);
        assert_eq!(parse_video_dir("preview_7"), None);
        assert_eq!(parse_video_dir("video_x"), None);
    }
}
