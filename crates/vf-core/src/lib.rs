//! vf-core: shared types for the videoflix transcoding backend.
//!
//! Carries the unified error type, typed entity ids, application
//! configuration, media-domain enums with the bitrate ladder, and the
//! heartbeat store shared between request handlers and encoder supervisors.

pub mod config;
pub mod error;
pub mod heartbeat;
pub mod ids;
pub mod media;

pub use error::{Error, Result};
pub use heartbeat::{Heartbeat, HeartbeatStore};
pub use ids::{PreviewId, VideoId};
pub use media::{PreviewStatus, Resolution, VideoCodec};
