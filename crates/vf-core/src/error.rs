//! Unified error type for the videoflix application.
//!
//! All crates funnel their failures into [`Error`], which carries enough
//! context for API handlers to derive an HTTP status code via
//! [`Error::http_status`].

use std::fmt;

/// Longest stderr excerpt kept on an encode failure.
const STDERR_TAIL: usize = 2000;

/// Unified error type covering all failure modes in videoflix.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "video", "segment").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Another writer currently holds the lock for this artifact.
    #[error("Busy: {0}")]
    Busy(String),

    /// The probe produced no usable keyframes for the source.
    #[error("No keyframes available for {path}")]
    KeyframesUnavailable {
        /// The source file that was probed.
        path: String,
    },

    /// The encoder exited with a failure; carries a stderr tail.
    #[error("Encode failed: {detail}")]
    Encode {
        /// Trailing stderr output (at most 2000 chars) or exit description.
        detail: String,
    },

    /// A continuous worker self-terminated after 10 minutes without requests.
    #[error("Continuous worker killed due to inactivity")]
    InactiveTimeout,

    /// Media probing failed.
    #[error("Probe error: {0}")]
    Probe(String),

    /// An external tool (ffmpeg, ffprobe) could not be run.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// A database operation failed.
    #[error("Database error: {source}")]
    Database {
        /// The underlying database error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    ///
    /// `Busy` maps to 202: the artifact is being produced by another writer
    /// and the client is expected to retry.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Validation(_) => 400,
            Error::Busy(_) => 202,
            Error::KeyframesUnavailable { .. } => 500,
            Error::Encode { .. } => 500,
            Error::InactiveTimeout => 500,
            Error::Probe(_) => 500,
            Error::Tool { .. } => 500,
            Error::Database { .. } => 500,
            Error::Io { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Database`].
    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database {
            source: source.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Encode`], keeping only the last
    /// 2000 chars of the encoder's stderr.
    pub fn encode(detail: impl Into<String>) -> Self {
        let detail: String = detail.into();
        let detail = match detail.char_indices().nth_back(STDERR_TAIL - 1) {
            Some((idx, _)) if idx > 0 => detail[idx..].to_string(),
            _ => detail,
        };
        Error::Encode { detail }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = Error::not_found("video", 7);
        assert_eq!(err.to_string(), "video not found: 7");
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn busy_maps_to_accepted() {
        let err = Error::Busy("playlist generation in progress".into());
        assert_eq!(err.http_status(), 202);
    }

    #[test]
    fn keyframes_unavailable_display() {
        let err = Error::KeyframesUnavailable {
            path: "media/videos/a.mp4".into(),
        };
        assert!(err.to_string().contains("a.mp4"));
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn encode_keeps_stderr_tail() {
        let long = "x".repeat(5000);
        let err = Error::encode(long);
        match err {
            Error::Encode { detail } => assert_eq!(detail.len(), 2000),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn encode_short_stderr_unchanged() {
        let err = Error::encode("ffmpeg: no such file");
        assert_eq!(err.to_string(), "Encode failed: ffmpeg: no such file");
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn validation_display() {
        let err = Error::Validation("unsupported resolution".into());
        assert_eq!(err.http_status(), 400);
        assert!(err.to_string().contains("unsupported resolution"));
    }
}
