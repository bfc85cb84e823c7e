//! Preview clip queries.

use chrono::Utc;
use rusqlite::Connection;
use vf_core::{Error, PreviewId, PreviewStatus, Result, VideoId};

use crate::models::Preview;

pub const COLS: &str = "id, video_id, created_at, updated_at, start_offset,
    preview_duration, status, error_message, is_transcoded";

/// Get a preview by its own ID.
pub fn get_preview(conn: &Connection, id: PreviewId) -> Result<Option<Preview>> {
    let q = format!("SELECT {COLS} FROM previews WHERE id = ?1");
    match conn.query_row(&q, [id.as_i64()], Preview::from_row) {
        Ok(p) => Ok(Some(p)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Get the preview belonging to a video.
pub fn get_preview_by_video(conn: &Connection, video_id: VideoId) -> Result<Option<Preview>> {
    let q = format!("SELECT {COLS} FROM previews WHERE video_id = ?1");
    match conn.query_row(&q, [video_id.as_i64()], Preview::from_row) {
        Ok(p) => Ok(Some(p)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Get or create the preview for a video.
///
/// When a preview already exists (the source file was replaced), its clip
/// parameters are updated and the state machine is reset to `pending`.
/// Returns the preview and whether it was newly created.
pub fn get_or_create_preview(
    conn: &Connection,
    video_id: VideoId,
    start_offset: i64,
    preview_duration: i64,
) -> Result<(Preview, bool)> {
    if let Some(existing) = get_preview_by_video(conn, video_id)? {
        conn.execute(
            "UPDATE previews SET start_offset = ?2, preview_duration = ?3,
                status = 'pending', is_transcoded = 0, error_message = NULL,
                updated_at = ?4
             WHERE id = ?1",
            rusqlite::params![
                existing.id.as_i64(),
                start_offset,
                preview_duration,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| Error::database(e.to_string()))?;

        let preview = get_preview(conn, existing.id)?
            .ok_or_else(|| Error::not_found("preview", existing.id))?;
        return Ok((preview, false));
    }

    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO previews (video_id, created_at, updated_at, start_offset, preview_duration)
         VALUES (?1, ?2, ?2, ?3, ?4)",
        rusqlite::params![video_id.as_i64(), &now, start_offset, preview_duration],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    let id = PreviewId::from(conn.last_insert_rowid());
    let preview = get_preview(conn, id)?.ok_or_else(|| Error::not_found("preview", id))?;
    Ok((preview, true))
}

/// Advance the preview state machine.
///
/// `error` is stored for `failed`, cleared otherwise; `completed` also sets
/// the transcoded flag.
pub fn set_preview_status(
    conn: &Connection,
    id: PreviewId,
    status: PreviewStatus,
    error: Option<&str>,
) -> Result<()> {
    let transcoded = status == PreviewStatus::Completed;
    conn.execute(
        "UPDATE previews SET status = ?2, error_message = ?3, is_transcoded = ?4,
            updated_at = ?5
         WHERE id = ?1",
        rusqlite::params![
            id.as_i64(),
            status.to_string(),
            error,
            transcoded as i64,
            Utc::now().to_rfc3339(),
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Reset a preview to `pending`, clearing the transcoded flag and error.
pub fn reset_preview(conn: &Connection, id: PreviewId) -> Result<()> {
    set_preview_status(conn, id, PreviewStatus::Pending, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{get_conn, init_memory_pool};
    use crate::queries::videos::{create_video, NewVideo};

    fn video(conn: &Connection) -> VideoId {
        create_video(
            conn,
            &NewVideo {
                source_path: "videos/a.mp4".into(),
                ..Default::default()
            },
        )
        .unwrap()
        .id
    }

    #[test]
    fn create_then_get() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        let video_id = video(&conn);

        let (preview, created) = get_or_create_preview(&conn, video_id, 180, 120).unwrap();
        assert!(created);
        assert_eq!(preview.start_offset, 180);
        assert_eq!(preview.preview_duration, 120);
        assert_eq!(preview.status, PreviewStatus::Pending);

        let by_video = get_preview_by_video(&conn, video_id).unwrap().unwrap();
        assert_eq!(by_video.id, preview.id);
    }

    #[test]
    fn existing_preview_is_reset() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        let video_id = video(&conn);

        let (preview, _) = get_or_create_preview(&conn, video_id, 0, 60).unwrap();
        set_preview_status(&conn, preview.id, PreviewStatus::Failed, Some("boom")).unwrap();

        let (again, created) = get_or_create_preview(&conn, video_id, 30, 90).unwrap();
        assert!(!created);
        assert_eq!(again.id, preview.id);
        assert_eq!(again.start_offset, 30);
        assert_eq!(again.status, PreviewStatus::Pending);
        assert!(again.error_message.is_none());
        assert!(!again.is_transcoded);
    }

    #[test]
    fn status_transitions() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        let video_id = video(&conn);

        let (preview, _) = get_or_create_preview(&conn, video_id, 0, 120).unwrap();

        set_preview_status(&conn, preview.id, PreviewStatus::Processing, None).unwrap();
        let p = get_preview(&conn, preview.id).unwrap().unwrap();
        assert_eq!(p.status, PreviewStatus::Processing);

        set_preview_status(&conn, preview.id, PreviewStatus::Completed, None).unwrap();
        let p = get_preview(&conn, preview.id).unwrap().unwrap();
        assert_eq!(p.status, PreviewStatus::Completed);
        assert!(p.is_transcoded);

        set_preview_status(&conn, preview.id, PreviewStatus::Failed, Some("stderr tail")).unwrap();
        let p = get_preview(&conn, preview.id).unwrap().unwrap();
        assert_eq!(p.error_message.as_deref(), Some("stderr tail"));
        assert!(!p.is_transcoded);
    }
}
