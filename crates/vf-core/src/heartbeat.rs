//! Last-requested-segment heartbeat store.
//!
//! Every numbered segment request updates the entry for its
//! `(video, resolution)` pair; the continuous-encoder supervisor reads it to
//! throttle or kill itself. Entries have no TTL — the supervisor judges
//! staleness from the timestamp and clears its own entry on exit.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::RwLock;

use crate::ids::VideoId;
use crate::media::Resolution;

/// Key identifying one output stream.
pub type HeartbeatKey = (VideoId, Resolution);

/// The most recent player request for a `(video, resolution)` pair.
#[derive(Debug, Clone, Copy)]
pub struct Heartbeat {
    /// Last requested segment index.
    pub segment: u64,
    /// When the request was observed.
    pub ts: Instant,
}

impl Heartbeat {
    /// Time elapsed since the last request.
    pub fn age(&self) -> std::time::Duration {
        self.ts.elapsed()
    }
}

/// Shared heartbeat map with last-writer-wins semantics.
#[derive(Debug, Default)]
pub struct HeartbeatStore {
    entries: RwLock<HashMap<HeartbeatKey, Heartbeat>>,
}

impl HeartbeatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a segment request, overwriting any previous entry.
    pub fn set(&self, video: VideoId, resolution: Resolution, segment: u64) {
        self.entries.write().insert(
            (video, resolution),
            Heartbeat {
                segment,
                ts: Instant::now(),
            },
        );
    }

    /// Read the current entry, if any.
    pub fn get(&self, video: VideoId, resolution: Resolution) -> Option<Heartbeat> {
        self.entries.read().get(&(video, resolution)).copied()
    }

    /// Remove the entry for a stream.
    pub fn clear(&self, video: VideoId, resolution: Resolution) {
        self.entries.write().remove(&(video, resolution));
    }
}
