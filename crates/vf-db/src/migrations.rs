//! Embedded SQL migrations and runner.
//!
//! Migrations are stored as `&str` constants and executed in order.  A
//! `schema_migrations` table tracks which versions have been applied.

use rusqlite::Connection;
use vf_core::{Error, Result};

/// V1: initial schema -- catalog videos and their preview clips.
const V1_INITIAL: &str = r#"
-- Catalog videos
CREATE TABLE videos (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at         TEXT NOT NULL,
    title              TEXT NOT NULL DEFAULT '',
    description        TEXT NOT NULL DEFAULT '',
    category           TEXT NOT NULL DEFAULT '',
    kind               TEXT NOT NULL DEFAULT '',
    source_path        TEXT NOT NULL,
    video_codec        TEXT,
    audio_codec        TEXT,
    resolution         TEXT,
    bitrate_kbps       INTEGER,
    audio_bitrate_kbps INTEGER,
    duration_secs      REAL,
    poster_url         TEXT,
    thumbnail_url      TEXT,
    imdb_id            TEXT,
    release_year       INTEGER,
    is_transcoded      INTEGER NOT NULL DEFAULT 0
);

-- One preview clip per video
CREATE TABLE previews (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    video_id         INTEGER NOT NULL UNIQUE REFERENCES videos(id) ON DELETE CASCADE,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    start_offset     INTEGER NOT NULL DEFAULT 0,
    preview_duration INTEGER NOT NULL DEFAULT 120,
    status           TEXT NOT NULL DEFAULT 'pending',
    error_message    TEXT,
    is_transcoded    INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX idx_videos_created_at ON videos(created_at);
"#;

/// All migrations in order. Index + 1 == schema version.
const MIGRATIONS: &[&str] = &[V1_INITIAL];

/// Run all pending migrations on the given connection.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
        [],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| Error::database(e.to_string()))?;

    for (idx, sql) in MIGRATIONS.iter().enumerate() {
        let version = (idx + 1) as i64;
        if version <= current {
            continue;
        }

        conn.execute_batch(sql)
            .map_err(|e| Error::database(format!("migration v{version} failed: {e}")))?;
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![version, chrono::Utc::now().to_rfc3339()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    }

    Ok(())
}
