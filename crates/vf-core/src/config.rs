//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries the
//! sub-configs for server, media layout, external tools, and the optional
//! metadata provider. Every section defaults sensibly so a completely empty
//! `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::ids::{PreviewId, VideoId};
use crate::media::Resolution;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub media: MediaConfig,
    pub tools: ToolsConfig,
    pub metadata: MetadataConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            media: MediaConfig::default(),
            tools: ToolsConfig::default(),
            metadata: MetadataConfig::default(),
        }
    }
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.media.site_url.ends_with('/') {
            warnings.push("media.site_url has a trailing slash; URLs will contain '//'".into());
        }

        if self.metadata.api_key.is_some() && self.metadata.endpoint.is_none() {
            warnings.push("metadata.api_key is set but metadata.endpoint is not".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            db_path: PathBuf::from("videoflix.db"),
        }
    }
}

/// Media storage layout.
///
/// All derived artifacts live under [`MediaConfig::root`]:
///
/// ```text
/// <root>/videos/<source>
/// <root>/index/video_<id>/index.m3u8
/// <root>/index/video_<id>/thumbnail.jpg
/// <root>/transcode/video_<id>/<res>/segment_NNN.mp4
/// <root>/hls_preview/preview_<id>/index.m3u8
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Base media directory.
    pub root: PathBuf,
    /// Public base URL used to build thumbnail/poster links.
    pub site_url: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("media"),
            site_url: "http://localhost:8000".into(),
        }
    }
}

impl MediaConfig {
    /// Directory holding uploaded source files.
    pub fn videos_dir(&self) -> PathBuf {
        self.root.join("videos")
    }

    /// Resolve a stored source path against the media root.
    ///
    /// Video rows store source paths relative to the root (`videos/x.mp4`);
    /// absolute paths pass through untouched.
    pub fn resolve_source(&self, source_path: &str) -> PathBuf {
        let path = Path::new(source_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Per-video index directory (playlist + thumbnail).
    pub fn index_dir(&self, video: VideoId) -> PathBuf {
        self.root.join("index").join(format!("video_{video}"))
    }

    /// Path of the synthesized playlist for a video.
    pub fn playlist_path(&self, video: VideoId) -> PathBuf {
        self.index_dir(video).join("index.m3u8")
    }

    /// Path of the generated thumbnail for a video.
    pub fn thumbnail_path(&self, video: VideoId) -> PathBuf {
        self.index_dir(video).join("thumbnail.jpg")
    }

    /// Public URL of the generated thumbnail.
    pub fn thumbnail_url(&self, video: VideoId) -> String {
        format!("{}/thumbnail/video_{video}/thumbnail.jpg", self.site_url)
    }

    /// Per-video transcode root, holding one directory per resolution.
    pub fn video_transcode_dir(&self, video: VideoId) -> PathBuf {
        self.root.join("transcode").join(format!("video_{video}"))
    }

    /// Output directory for one `(video, resolution)` pair.
    pub fn transcode_dir(&self, video: VideoId, resolution: Resolution) -> PathBuf {
        self.video_transcode_dir(video).join(resolution.to_string())
    }

    /// HLS output directory for a preview clip.
    pub fn preview_dir(&self, preview: PreviewId) -> PathBuf {
        self.root
            .join("hls_preview")
            .join(format!("preview_{preview}"))
    }
}

/// External tool locations. Empty paths mean "search PATH".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

/// Optional OMDb-compatible metadata provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Provider base URL, e.g. `http://www.omdbapi.com`.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
}
