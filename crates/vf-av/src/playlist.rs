//! HLS playlist synthesis from source keyframes.
//!
//! Segment boundaries are derived from the source's keyframe list: segment
//! `i` spans three keyframe intervals, and its advertised `EXTINF` is
//! `3 * (k[i+1] - k[i])`. The playlist does not depend on the target
//! resolution — all encoder variants share the same segment boundaries.
//!
//! The playlist type is EVENT with no `#EXT-X-ENDLIST`: segments keep
//! appearing while the continuous encoder runs. A `#EXT-X-DISCONTINUITY`
//! precedes every segment because each one may come from an independent
//! encoder invocation with reset timestamps.

use std::io::Write;
use std::path::Path;

use crate::locks::LockRegistry;
use crate::probe;
use crate::tools::ToolRegistry;

/// Compose the playlist text for a keyframe sequence.
///
/// Requires at least two keyframes; callers gate on that
/// (see [`synthesize`]).
pub fn build_playlist(keyframes: &[f64]) -> String {
    debug_assert!(keyframes.len() >= 2);

    let k0 = keyframes[0];
    // Target duration comes from the first four keyframes; clamp for very
    // short sources.
    let k3 = keyframes[keyframes.len().min(4) - 1];
    let target_duration = (k3 - k0).ceil() as u64 + 1;

    let mut out = String::from("#EXTM3U\n#EXT-X-VERSION:6\n");
    out.push_str("#EXT-X-MEDIA-SEQUENCE:0\n");
    out.push_str("#EXT-X-MAP:URI=\"init.mp4\"\n");
    out.push_str("#EXT-X-ALLOW-CACHE:YES\n");
    out.push_str("#EXT-X-PLAYLIST-TYPE:EVENT\n");
    out.push_str(&format!("#EXT-X-TARGETDURATION:{target_duration}\n"));
    out.push_str("#EXT-X-START:TIME-OFFSET=0.01,PRECISE=NO\n");

    let segments = (keyframes.len() - 1) / 3 + 1;
    for i in 0..segments {
        let duration = (keyframes[i + 1] - keyframes[i]) * 3.0;
        out.push_str("#EXT-X-DISCONTINUITY\n");
        out.push_str(&format!("#EXTINF:{duration:.3},\nsegment_{i:03}.mp4\n"));
    }

    out
}

/// Synthesize the playlist for `source` at `m3u8_path`.
///
/// On a first call (or with `force`) this acquires the directory lockfile,
/// extracts keyframes, writes the playlist atomically, and releases the
/// lock. An existing file is simply read back unless `force` is set.
///
/// # Errors
///
/// - [`vf_core::Error::Busy`] when another writer holds the lock.
/// - [`vf_core::Error::KeyframesUnavailable`] when the probe yields fewer
///   than two keyframes.
pub async fn synthesize(
    tools: &ToolRegistry,
    locks: &LockRegistry,
    source: &Path,
    m3u8_path: &Path,
    force: bool,
) -> vf_core::Result<String> {
    if !force && m3u8_path.exists() {
        return Ok(std::fs::read_to_string(m3u8_path)?);
    }

    let dir = m3u8_path
        .parent()
        .ok_or_else(|| vf_core::Error::Internal("playlist path has no parent".into()))?;
    std::fs::create_dir_all(dir)?;

    let lockfile = dir.join("lockfile.lock");
    if !locks.try_acquire(&lockfile)? {
        return Err(vf_core::Error::Busy(
            "playlist generation already in progress".into(),
        ));
    }

    let result = synthesize_locked(tools, source, m3u8_path).await;
    locks.release(&lockfile);
    result
}

async fn synthesize_locked(
    tools: &ToolRegistry,
    source: &Path,
    m3u8_path: &Path,
) -> vf_core::Result<String> {
    let keyframes = probe::keyframes(tools, source).await?;
    tracing::info!(
        source = %source.display(),
        keyframes = keyframes.len(),
        "Extracted keyframes for playlist"
    );

    if keyframes.len() < 2 {
        return Err(vf_core::Error::KeyframesUnavailable {
            path: source.display().to_string(),
        });
    }

    let content = build_playlist(&keyframes);

    let dir = m3u8_path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.persist(m3u8_path)
        .map_err(|e| vf_core::Error::Io { source: e.error })?;

    Ok(content)
}

/// Recover the advertised `EXTINF` duration for a segment from playlist text.
///
/// Finds the URI line matching `segment_name` and walks backwards to the
/// nearest `#EXTINF:` tag.
pub fn extinf_for(playlist: &str, segment_name: &str) -> Option<f64> {
    let target = segment_name.rsplit('/').next().unwrap_or(segment_name);
    let lines: Vec<&str> = playlist.lines().map(str::trim).collect();

    let uri_idx = lines
        .iter()
        .position(|&line| line == target || line.ends_with(&format!("/{target}")))?;

    lines[..uri_idx].iter().rev().find_map(|line| {
        line.strip_prefix("#EXTINF:")
            .and_then(|rest| rest.split(',').next())
            .and_then(|v| v.trim().parse::<f64>().ok())
    })
}
