//! HLS playlist and segment route handlers.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use vf_core::{Resolution, VideoId};

use crate::context::AppContext;
use crate::error::AppError;
use crate::routes::user_from_headers;
use crate::scheduler;

pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
pub const SEGMENT_CONTENT_TYPE: &str = "video/mpegts";

#[derive(Debug, Default, Deserialize)]
pub struct PlaylistQuery {
    /// `?recreate=true` forces playlist regeneration.
    pub recreate: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SegmentQuery {
    /// Optional explicit bitrate, validated against the ladder.
    pub bitrate: Option<String>,
}

fn parse_resolution(raw: &str) -> Result<Resolution, AppError> {
    raw.parse::<Resolution>().map_err(AppError::from)
}

/// GET /video/{id}/{resolution}/index.m3u8
pub async fn get_playlist(
    State(ctx): State<AppContext>,
    Path((video_id, resolution)): Path<(i64, String)>,
    Query(query): Query<PlaylistQuery>,
    headers: HeaderMap,
) -> Response {
    let resolution = match parse_resolution(&resolution) {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };
    let user = user_from_headers(&headers);
    let force = query
        .recreate
        .as_deref()
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));

    match scheduler::serve_playlist(&ctx, VideoId::from(video_id), resolution, &user, force).await
    {
        Ok(playlist) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE)],
            playlist,
        )
            .into_response(),
        Err(e @ vf_core::Error::Busy(_)) => (
            StatusCode::ACCEPTED,
            Json(json!({ "error": format!("Failed to generate playlist: {e}") })),
        )
            .into_response(),
        Err(e) => AppError::from(e).into_response(),
    }
}

/// GET /video/{id}/{resolution}/{segment}
pub async fn get_segment(
    State(ctx): State<AppContext>,
    Path((video_id, resolution, segment)): Path<(i64, String, String)>,
    Query(query): Query<SegmentQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let resolution = parse_resolution(&resolution)?;
    let user = user_from_headers(&headers);

    let bytes = scheduler::serve_segment(
        &ctx,
        VideoId::from(video_id),
        resolution,
        &segment,
        &user,
        query.bitrate.as_deref(),
    )
    .await?;

    Ok(segment_response(&segment, bytes))
}

/// Build a segment response with the mpegts content type and an inline
/// disposition so players stream instead of downloading.
pub(crate) fn segment_response(segment_name: &str, bytes: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, SEGMENT_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{segment_name}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}
