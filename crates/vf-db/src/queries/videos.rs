//! Catalog video queries.

use chrono::Utc;
use rusqlite::Connection;
use vf_core::{Error, Result, VideoId};

use crate::models::Video;

pub const COLS: &str = "id, created_at, title, description, category, kind, source_path,
    video_codec, audio_codec, resolution, bitrate_kbps, audio_bitrate_kbps,
    duration_secs, poster_url, thumbnail_url, imdb_id, release_year, is_transcoded";

/// Fields supplied when registering a new upload.
#[derive(Debug, Clone, Default)]
pub struct NewVideo {
    pub title: String,
    pub description: String,
    pub category: String,
    pub kind: String,
    pub source_path: String,
    pub imdb_id: Option<String>,
    pub release_year: Option<i32>,
}

/// Insert a new video row and return it.
pub fn create_video(conn: &Connection, new: &NewVideo) -> Result<Video> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO videos (created_at, title, description, category, kind,
            source_path, imdb_id, release_year)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            &now,
            &new.title,
            &new.description,
            &new.category,
            &new.kind,
            &new.source_path,
            &new.imdb_id,
            &new.release_year,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    let id = VideoId::from(conn.last_insert_rowid());
    get_video(conn, id)?.ok_or_else(|| Error::not_found("video", id))
}

/// Get a video by ID.
pub fn get_video(conn: &Connection, id: VideoId) -> Result<Option<Video>> {
    let q = format!("SELECT {COLS} FROM videos WHERE id = ?1");
    match conn.query_row(&q, [id.as_i64()], Video::from_row) {
        Ok(v) => Ok(Some(v)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List all videos, newest first.
pub fn list_videos(conn: &Connection) -> Result<Vec<Video>> {
    let q = format!("SELECT {COLS} FROM videos ORDER BY created_at DESC, id DESC");
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([], Video::from_row)
        .map_err(|e| Error::database(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))
}

/// Persist the catalog fields of an in-memory video (title, description,
/// category, kind, release year, poster/thumbnail URLs).
///
/// The post-upload pipeline saves progressively after each metadata step.
pub fn update_catalog_fields(conn: &Connection, video: &Video) -> Result<()> {
    conn.execute(
        "UPDATE videos SET title = ?2, description = ?3, category = ?4, kind = ?5,
            release_year = ?6, poster_url = ?7, thumbnail_url = ?8
         WHERE id = ?1",
        rusqlite::params![
            video.id.as_i64(),
            &video.title,
            &video.description,
            &video.category,
            &video.kind,
            &video.release_year,
            &video.poster_url,
            &video.thumbnail_url,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Persist the technical fields filled in by the probe.
pub fn update_technical_fields(conn: &Connection, video: &Video) -> Result<()> {
    conn.execute(
        "UPDATE videos SET video_codec = ?2, audio_codec = ?3, resolution = ?4,
            bitrate_kbps = ?5, audio_bitrate_kbps = ?6, duration_secs = ?7
         WHERE id = ?1",
        rusqlite::params![
            video.id.as_i64(),
            &video.video_codec,
            &video.audio_codec,
            &video.resolution,
            &video.bitrate_kbps,
            &video.audio_bitrate_kbps,
            &video.duration_secs,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Flip the transcoded flag.
pub fn set_transcoded(conn: &Connection, id: VideoId, transcoded: bool) -> Result<()> {
    conn.execute(
        "UPDATE videos SET is_transcoded = ?2 WHERE id = ?1",
        rusqlite::params![id.as_i64(), transcoded as i64],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Delete a video row (previews cascade). Returns whether a row was removed.
pub fn delete_video(conn: &Connection, id: VideoId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM videos WHERE id = ?1", [id.as_i64()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}
