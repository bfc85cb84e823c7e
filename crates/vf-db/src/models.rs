//! Rust structs mapping to database tables.
//!
//! Each model implements `from_row` for constructing itself from a
//! `rusqlite::Row`.

use std::str::FromStr;

use vf_core::{PreviewId, PreviewStatus, VideoId};

// ---------------------------------------------------------------------------
// Video
// ---------------------------------------------------------------------------

/// A catalog video: one uploaded source file plus its technical and catalog
/// metadata. Technical fields are `None` until the post-upload probe fills
/// them in.
#[derive(Debug, Clone)]
pub struct Video {
    pub id: VideoId,
    pub created_at: String,
    pub title: String,
    pub description: String,
    pub category: String,
    /// movie, series, etc.
    pub kind: String,
    /// Source file path relative to the media root (or absolute).
    pub source_path: String,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    /// Source resolution as `WxH`.
    pub resolution: Option<String>,
    pub bitrate_kbps: Option<i64>,
    pub audio_bitrate_kbps: Option<i64>,
    pub duration_secs: Option<f64>,
    pub poster_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub imdb_id: Option<String>,
    pub release_year: Option<i32>,
    pub is_transcoded: bool,
}

impl Video {
    /// Build from a row selected with [`crate::queries::videos::COLS`].
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: VideoId::from(row.get::<_, i64>(0)?),
            created_at: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            category: row.get(4)?,
            kind: row.get(5)?,
            source_path: row.get(6)?,
            video_codec: row.get(7)?,
            audio_codec: row.get(8)?,
            resolution: row.get(9)?,
            bitrate_kbps: row.get(10)?,
            audio_bitrate_kbps: row.get(11)?,
            duration_secs: row.get(12)?,
            poster_url: row.get(13)?,
            thumbnail_url: row.get(14)?,
            imdb_id: row.get(15)?,
            release_year: row.get(16)?,
            is_transcoded: row.get::<_, i64>(17)? != 0,
        })
    }

    /// Source frame height parsed from the stored `WxH` resolution.
    pub fn source_height(&self) -> Option<u32> {
        let res = self.resolution.as_deref()?;
        let (_, h) = res.split_once('x')?;
        h.parse().ok()
    }
}

// ---------------------------------------------------------------------------
// Preview
// ---------------------------------------------------------------------------

/// Short preview clip of a video; lifecycle bound to its parent row.
#[derive(Debug, Clone)]
pub struct Preview {
    pub id: PreviewId,
    pub video_id: VideoId,
    pub created_at: String,
    pub updated_at: String,
    /// Seconds into the source where the clip starts.
    pub start_offset: i64,
    /// Clip length in seconds (at most 120).
    pub preview_duration: i64,
    pub status: PreviewStatus,
    pub error_message: Option<String>,
    pub is_transcoded: bool,
}

impl Preview {
    /// Build from a row selected with [`crate::queries::previews::COLS`].
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let status_text: String = row.get(6)?;
        let status = PreviewStatus::from_str(&status_text).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    e.to_string(),
                )),
            )
        })?;

        Ok(Self {
            id: PreviewId::from(row.get::<_, i64>(0)?),
            video_id: VideoId::from(row.get::<_, i64>(1)?),
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
            start_offset: row.get(4)?,
            preview_duration: row.get(5)?,
            status,
            error_message: row.get(7)?,
            is_transcoded: row.get::<_, i64>(8)? != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_height_parses_wxh() {
        let mut video = Video {
            id: VideoId::from(1),
            created_at: String::new(),
            title: String::new(),
            description: String::new(),
            category: String::new(),
            kind: String::new(),
            source_path: "videos/a.mp4".into(),
            video_codec: None,
            audio_codec: None,
            resolution: Some("1920x1080".into()),
            bitrate_kbps: None,
            audio_bitrate_kbps: None,
            duration_secs: None,
            poster_url: None,
            thumbnail_url: None,
            imdb_id: None,
            release_year: None,
            is_transcoded: false,
        };
        assert_eq!(video.source_height(), Some(1080));

        video.resolution = Some("garbage".into());
        assert_eq!(video.source_height(), None);

        video.resolution = None;
        assert_eq!(video.source_height(), None);
    }
}
