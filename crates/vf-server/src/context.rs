//! Service-oriented application context.
//!
//! [`AppContext`] is the central struct shared across all route handlers via
//! Axum state. It is cheaply cloneable because it only holds `Arc`s (plus
//! the pooled DB handle, which is itself an `Arc` internally).

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use vf_av::{LockRegistry, ToolRegistry};
use vf_core::config::Config;
use vf_core::{HeartbeatStore, VideoId};
use vf_db::pool::DbPool;

use crate::jobs::JobQueue;
use crate::metadata::OmdbClient;

/// Cached playlist lifetime: one hour.
const PLAYLIST_TTL: Duration = Duration::from_secs(60 * 60);

// ---------------------------------------------------------------------------
// PlaylistCache
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct CachedPlaylist {
    content: String,
    expires: Instant,
}

/// In-memory playlist cache with a fixed TTL.
///
/// Synthesis is idempotent, so concurrent fills are race-tolerant: last
/// write wins.
#[derive(Debug, Default)]
pub struct PlaylistCache {
    entries: DashMap<VideoId, CachedPlaylist>,
}

impl PlaylistCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached playlist text, dropping expired entries.
    pub fn get(&self, video: VideoId) -> Option<String> {
        let entry = self.entries.get(&video)?;
        if entry.expires <= Instant::now() {
            drop(entry);
            self.entries.remove(&video);
            return None;
        }
        Some(entry.content.clone())
    }

    /// Store a playlist, replacing any previous entry.
    pub fn insert(&self, video: VideoId, content: String) {
        self.entries.insert(
            video,
            CachedPlaylist {
                content,
                expires: Instant::now() + PLAYLIST_TTL,
            },
        );
    }

    /// Drop a cached playlist (used on delete and forced regeneration).
    pub fn invalidate(&self, video: VideoId) {
        self.entries.remove(&video);
    }
}

// ---------------------------------------------------------------------------
// AppContext
// ---------------------------------------------------------------------------

/// Application context shared by all request handlers (via Axum state).
#[derive(Clone)]
pub struct AppContext {
    /// Database connection pool.
    pub db: DbPool,
    /// Immutable application configuration.
    pub config: Arc<Config>,
    /// External tool registry (ffmpeg, ffprobe).
    pub tools: Arc<ToolRegistry>,
    /// Filesystem lock registry shared by all encoder invocations.
    pub locks: Arc<LockRegistry>,
    /// Last-requested-segment heartbeats.
    pub heartbeat: Arc<HeartbeatStore>,
    /// Synthesized playlist cache.
    pub playlists: Arc<PlaylistCache>,
    /// In-process background job queue.
    pub jobs: Arc<JobQueue>,
    /// Optional external metadata provider.
    pub metadata: Option<Arc<OmdbClient>>,
}

impl AppContext {
    /// Build a context from a database pool and configuration.
    pub fn new(db: DbPool, config: Config) -> Self {
        let tools = Arc::new(ToolRegistry::discover(&config.tools));
        let metadata = OmdbClient::from_config(&config.metadata).map(Arc::new);

        Self {
            db,
            config: Arc::new(config),
            tools,
            locks: Arc::new(LockRegistry::new()),
            heartbeat: Arc::new(HeartbeatStore::new()),
            playlists: Arc::new(PlaylistCache::new()),
            jobs: Arc::new(JobQueue::new()),
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playlist_cache_round_trip() {
        let cache = PlaylistCache::new();
        let video = VideoId::from(7);

        assert!(cache.get(video).is_none());
        cache.insert(video, "#EXTM3U\n".into());
        assert_eq!(cache.get(video).as_deref(), Some("#EXTM3U\n"));

        cache.invalidate(video);
        assert!(cache.get(video).is_none());
    }

    #[test]
    fn context_builds_from_default_config() {
        let db = vf_db::pool::init_memory_pool().unwrap();
        let ctx = AppContext::new(db, Config::default());
        assert!(ctx.metadata.is_none());
    }
}
