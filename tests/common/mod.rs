//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which creates an in-memory DB, a tempdir media
//! root, and a full [`AppContext`]. The [`with_server`] constructor starts
//! Axum on a random port for HTTP-level testing.

use std::net::SocketAddr;
use std::path::PathBuf;

use tempfile::TempDir;

use vf_core::config::Config;
use vf_core::{Resolution, VideoId};
use vf_db::models::Video;
use vf_db::queries::videos::{create_video, NewVideo};
use vf_server::context::AppContext;
use vf_server::router::build_router;

/// Test harness wrapping a fully-constructed [`AppContext`] backed by an
/// in-memory database and a throwaway media root.
pub struct TestHarness {
    pub ctx: AppContext,
    /// Owns the media root; dropped with the harness.
    _media_root: TempDir,
}

impl TestHarness {
    /// Create a new harness with default configuration, an in-memory DB,
    /// and a tempdir media root.
    pub fn new() -> Self {
        let media_root = tempfile::tempdir().expect("failed to create media root");
        let mut config = Config::default();
        config.media.root = media_root.path().to_path_buf();

        let db = vf_db::pool::init_memory_pool().expect("failed to create in-memory pool");
        let ctx = AppContext::new(db, config);

        Self {
            ctx,
            _media_root: media_root,
        }
    }

    /// Start an Axum server on a random port and return the harness
    /// together with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        let harness = Self::new();
        let app = build_router(harness.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }

    /// Insert a video row with probed technical fields filled in.
    pub fn seed_video(&self) -> Video {
        let conn = vf_db::pool::get_conn(&self.ctx.db).unwrap();
        let mut video = create_video(
            &conn,
            &NewVideo {
                title: "Test Video".into(),
                source_path: "videos/test.mp4".into(),
                ..Default::default()
            },
        )
        .unwrap();
        video.video_codec = Some("h264".into());
        video.audio_codec = Some("aac".into());
        video.resolution = Some("1920x1080".into());
        video.bitrate_kbps = Some(4500);
        video.duration_secs = Some(600.0);
        vf_db::queries::videos::update_technical_fields(&conn, &video).unwrap();
        vf_db::queries::videos::get_video(&conn, video.id)
            .unwrap()
            .unwrap()
    }

    /// Output directory for a `(video, resolution)` pair under the harness
    /// media root.
    pub fn transcode_dir(&self, video: VideoId, resolution: Resolution) -> PathBuf {
        self.ctx.config.media.transcode_dir(video, resolution)
    }

    /// Write a playlist file for a video so synthesis short-circuits
    /// without probing.
    pub fn seed_playlist(&self, video: VideoId, content: &str) {
        let path = self.ctx.config.media.playlist_path(video);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    /// Write a fake segment file into an output directory.
    pub fn seed_segment(&self, video: VideoId, resolution: Resolution, name: &str, bytes: &[u8]) {
        let dir = self.transcode_dir(video, resolution);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(name), bytes).unwrap();
    }
}
