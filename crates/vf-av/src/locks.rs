//! Filesystem lockfiles serializing writers per output directory.
//!
//! A lockfile exists exactly while a writer owns its artifact. Acquisition is
//! advisory between cooperating processes on the same filesystem and is not
//! reentrant. The registry additionally tracks locks held by this process in
//! memory so intra-process callers do not race each other on the filesystem.
//!
//! Stale-lock policy: a lockfile whose mtime is older than [`STALE_AFTER`]
//! is assumed to be left over from a crashed writer and is reclaimed.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use vf_core::Result;

/// Age after which an on-disk lockfile is considered abandoned.
const STALE_AFTER: Duration = Duration::from_secs(600);

/// In-process front for filesystem lockfiles.
#[derive(Debug, Default)]
pub struct LockRegistry {
    held: Mutex<HashSet<PathBuf>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to acquire the lock at `path`.
    ///
    /// Creates parent directories if missing. Returns `true` when the lock
    /// was acquired, `false` when another writer holds it. The lockfile
    /// contains this process's pid for post-mortem inspection.
    pub fn try_acquire(&self, path: &Path) -> Result<bool> {
        let mut held = self.held.lock();
        if held.contains(path) {
            return Ok(false);
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match self.create_lockfile(path) {
            Ok(true) => {
                held.insert(path.to_path_buf());
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Release the lock at `path`, ignoring absence.
    pub fn release(&self, path: &Path) {
        self.held.lock().remove(path);
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove lockfile {}: {e}", path.display());
            }
        }
    }

    fn create_lockfile(&self, path: &Path) -> Result<bool> {
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(mut f) => {
                let _ = write!(f, "{}", std::process::id());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if lockfile_is_stale(path) {
                    tracing::warn!("Reclaiming stale lockfile {}", path.display());
                    let _ = std::fs::remove_file(path);
                    // Single retry; a concurrent reclaimer may win the race.
                    match std::fs::OpenOptions::new()
                        .write(true)
                        .create_new(true)
                        .open(path)
                    {
                        Ok(mut f) => {
                            let _ = write!(f, "{}", std::process::id());
                            Ok(true)
                        }
                        Err(_) => Ok(false),
                    }
                } else {
                    Ok(false)
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn lockfile_is_stale(path: &Path) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|mtime| mtime.elapsed().ok())
        .map(|age| age > STALE_AFTER)
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Continuous-encoder descriptor
// ---------------------------------------------------------------------------

/// File name of the continuous-encoder descriptor inside an output directory.
pub const CONTINUOUS_LOCK: &str = "continuous.lock";

/// Descriptor of a running streaming encoder, persisted as JSON in its
/// output directory. Written by the supervisor on spawn; consumed by the
/// scheduler when it decides to override the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuousLock {
    /// OS pid of the encoder process.
    pub pid: u32,
    /// Job id of the owning worker, when enqueued under one.
    pub worker_id: Option<String>,
}

impl ContinuousLock {
    /// Path of the descriptor inside `output_dir`.
    pub fn path(output_dir: &Path) -> PathBuf {
        output_dir.join(CONTINUOUS_LOCK)
    }

    /// Read the descriptor from `output_dir`, returning `None` when absent
    /// or unparseable (a torn write is treated as no descriptor).
    pub fn read(output_dir: &Path) -> Option<Self> {
        let contents = std::fs::read_to_string(Self::path(output_dir)).ok()?;
        serde_json::from_str(&contents).ok()
    }

    /// Atomically write the descriptor into `output_dir` (temp + rename so
    /// readers never observe a partial JSON document).
    pub fn write(&self, output_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(output_dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(output_dir)?;
        let json = serde_json::to_string(self)
            .map_err(|e| vf_core::Error::Internal(format!("descriptor serialize: {e}")))?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(Self::path(output_dir))
            .map_err(|e| vf_core::Error::Io { source: e.error })?;
        Ok(())
    }

    /// Remove the descriptor, ignoring absence.
    pub fn remove(output_dir: &Path) {
        let path = Self::path(output_dir);
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove {}: {e}", path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_release_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("out/lockfile.lock");
        let registry = LockRegistry::new();

        assert!(registry.try_acquire(&lock).unwrap());
        assert!(lock.exists());
        // Second acquisition fails while held.
        assert!(!registry.try_acquire(&lock).unwrap());

        registry.release(&lock);
        assert!(!lock.exists());
        assert!(registry.try_acquire(&lock).unwrap());
        registry.release(&lock);
    }

    #[test]
    fn foreign_lockfile_blocks_acquisition() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("lockfile.lock");
        std::fs::write(&lock, "12345").unwrap();

        let registry = LockRegistry::new();
        // Fresh on-disk lock from "another process": not stale, not ours.
        assert!(!registry.try_acquire(&lock).unwrap());
    }

    #[test]
    fn release_ignores_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let registry = LockRegistry::new();
        registry.release(&dir.path().join("never-created.lock"));
    }

    #[test]
    fn descriptor_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let desc = ContinuousLock {
            pid: 4242,
            worker_id: Some("alice_720p_video7_720p".into()),
        };
        desc.write(dir.path()).unwrap();

        let read = ContinuousLock::read(dir.path()).unwrap();
        assert_eq!(read, desc);

        ContinuousLock::remove(dir.path());
        assert!(ContinuousLock::read(dir.path()).is_none());
    }

    #[test]
    fn torn_descriptor_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(ContinuousLock::path(dir.path()), "{\"pid\": 12").unwrap();
        assert!(ContinuousLock::read(dir.path()).is_none());
    }
}
