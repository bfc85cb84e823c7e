//! ffprobe-based source inspection.
//!
//! Two operations: [`probe`] extracts technical facts (codecs, resolution,
//! bitrates, duration) and [`keyframes`] extracts the keyframe timestamp
//! list that drives playlist synthesis. Numeric fields that ffprobe cannot
//! report are `None`, never zero — callers must treat them as unknown.

use std::cmp::Ordering;
use std::path::Path;

use serde::Deserialize;

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// Technical facts about a source file.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct SourceProbe {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub bitrate_kbps: Option<u32>,
    pub audio_bitrate_kbps: Option<u32>,
    pub duration_seconds: Option<f64>,
}

impl SourceProbe {
    /// Resolution as `WxH`, when both dimensions are known.
    pub fn resolution(&self) -> Option<String> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(format!("{w}x{h}")),
            _ => None,
        }
    }
}

/// Probe a source file for codec, resolution, bitrate, and duration.
///
/// Runs ffprobe twice: once over the streams, once over the format section,
/// which supplies `bit_rate`/`duration` for containers whose streams do not
/// carry them.
pub async fn probe(tools: &ToolRegistry, path: &Path) -> vf_core::Result<SourceProbe> {
    if !path.exists() {
        return Err(vf_core::Error::Probe(format!(
            "source does not exist: {}",
            path.display()
        )));
    }

    let ffprobe = tools.require("ffprobe")?;

    let streams_out = ToolCommand::new(ffprobe.path.clone())
        .args([
            "-v",
            "error",
            "-show_entries",
            "stream=index,codec_type,codec_name,width,height,bit_rate",
            "-of",
            "json",
        ])
        .arg(path.to_string_lossy().as_ref())
        .execute()
        .await
        .map_err(|e| vf_core::Error::Probe(e.to_string()))?;

    let format_out = ToolCommand::new(ffprobe.path.clone())
        .args(["-v", "error", "-show_entries", "format=bit_rate,duration", "-of", "json"])
        .arg(path.to_string_lossy().as_ref())
        .execute()
        .await
        .map_err(|e| vf_core::Error::Probe(e.to_string()))?;

    parse_probe_output(&streams_out.stdout, &format_out.stdout)
}

/// Extract the ordered keyframe timestamp list from a source file.
///
/// Timestamps are sorted, deduplicated, and guaranteed to start at 0.0
/// (inserted when the first keyframe is later than the stream start).
pub async fn keyframes(tools: &ToolRegistry, path: &Path) -> vf_core::Result<Vec<f64>> {
    let ffprobe = tools.require("ffprobe")?;

    let out = ToolCommand::new(ffprobe.path.clone())
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-skip_frame",
            "nokey",
            "-show_frames",
            "-show_entries",
            "frame=best_effort_timestamp_time",
            "-of",
            "json",
        ])
        .arg(path.to_string_lossy().as_ref())
        .execute()
        .await
        .map_err(|e| vf_core::Error::Probe(e.to_string()))?;

    parse_keyframes(&out.stdout)
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeStreams {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormatOutput {
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    bit_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFrames {
    #[serde(default)]
    frames: Vec<FfprobeFrame>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFrame {
    best_effort_timestamp_time: Option<String>,
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

fn parse_probe_output(streams_json: &str, format_json: &str) -> vf_core::Result<SourceProbe> {
    let streams: FfprobeStreams = serde_json::from_str(streams_json)
        .map_err(|e| vf_core::Error::Probe(format!("ffprobe JSON parse error: {e}")))?;
    let format: FfprobeFormatOutput = serde_json::from_str(format_json)
        .map_err(|e| vf_core::Error::Probe(format!("ffprobe JSON parse error: {e}")))?;

    let mut probe = SourceProbe::default();
    let mut video_bit_rate: Option<String> = None;
    let mut audio_bit_rate: Option<String> = None;

    for stream in &streams.streams {
        match stream.codec_type.as_deref() {
            Some("video") if probe.video_codec.is_none() => {
                probe.width = stream.width;
                probe.height = stream.height;
                probe.video_codec = stream.codec_name.clone();
                video_bit_rate = stream.bit_rate.clone();
            }
            Some("audio") if probe.audio_codec.is_none() => {
                probe.audio_codec = stream.codec_name.clone();
                audio_bit_rate = stream.bit_rate.clone();
            }
            _ => {}
        }
    }

    if let Some(fmt) = format.format {
        // Some codecs carry no per-stream bit_rate; fall back to the
        // container-level figure.
        if video_bit_rate.is_none() {
            video_bit_rate = fmt.bit_rate;
        }
        probe.duration_seconds = fmt.duration.and_then(|d| d.parse::<f64>().ok());
    }

    probe.bitrate_kbps = to_kbps(video_bit_rate.as_deref());
    probe.audio_bitrate_kbps = to_kbps(audio_bit_rate.as_deref());

    Ok(probe)
}

fn to_kbps(bit_rate: Option<&str>) -> Option<u32> {
    bit_rate
        .and_then(|s| s.parse::<u64>().ok())
        .map(|b| (b / 1000) as u32)
}

fn parse_keyframes(json: &str) -> vf_core::Result<Vec<f64>> {
    let frames: FfprobeFrames = serde_json::from_str(json)
        .map_err(|e| vf_core::Error::Probe(format!("ffprobe JSON parse error: {e}")))?;

    let mut keyframes: Vec<f64> = frames
        .frames
        .iter()
        .filter_map(|f| f.best_effort_timestamp_time.as_deref())
        .filter_map(|ts| ts.parse::<f64>().ok())
        .collect();

    keyframes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    keyframes.dedup();

    // Ensure the sequence starts at the stream origin.
    if keyframes.first().is_some_and(|&first| first > 0.001) {
        keyframes.insert(0, 0.0);
    }

    Ok(keyframes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAMS_JSON: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "video", "codec_name": "h264",
             "width": 1920, "height": 1080, "bit_rate": "4500000"},
            {"index": 1, "codec_type": "audio", "codec_name": "aac",
             "bit_rate": "128000"}
        ]
    }"#;

    const FORMAT_JSON: &str = r#"{
        "format": {"bit_rate": "4700000", "duration": "1800.042000"}
    }"#;

    #[test]
    fn parse_full_probe() {
        let probe = parse_probe_output(STREAMS_JSON, FORMAT_JSON).unwrap();
        assert_eq!(probe.width, Some(1920));
        assert_eq!(probe.height, Some(1080));
        assert_eq!(probe.video_codec.as_deref(), Some("h264"));
        assert_eq!(probe.audio_codec.as_deref(), Some("aac"));
        // Stream-level bit_rate wins over the format fallback.
        assert_eq!(probe.bitrate_kbps, Some(4500));
        assert_eq!(probe.audio_bitrate_kbps, Some(128));
        assert_eq!(probe.duration_seconds, Some(1800.042));
        assert_eq!(probe.resolution().as_deref(), Some("1920x1080"));
    }

    #[test]
    fn format_bitrate_fallback() {
        let streams = r#"{"streams": [
            {"index": 0, "codec_type": "video", "codec_name": "hevc",
             "width": 3840, "height": 2160}
        ]}"#;
        let probe = parse_probe_output(streams, FORMAT_JSON).unwrap();
        assert_eq!(probe.bitrate_kbps, Some(4700));
        assert_eq!(probe.audio_codec, None);
        assert_eq!(probe.audio_bitrate_kbps, None);
    }

    #[test]
    fn missing_fields_stay_unknown() {
        let probe = parse_probe_output(r#"{"streams": []}"#, r#"{}"#).unwrap();
        assert_eq!(probe, SourceProbe::default());
        assert!(probe.resolution().is_none());
    }

    #[test]
    fn unparseable_json_is_probe_error() {
        let err = parse_probe_output("not json", "{}").unwrap_err();
        assert!(matches!(err, vf_core::Error::Probe(_)));
    }

    #[test]
    fn keyframes_sorted_deduped_with_origin() {
        let json = r#"{"frames": [
            {"best_effort_timestamp_time": "4.171"},
            {"best_effort_timestamp_time": "2.085"},
            {"best_effort_timestamp_time": "2.085"},
            {"best_effort_timestamp_time": "6.256"}
        ]}"#;
        let kf = parse_keyframes(json).unwrap();
        assert_eq!(kf, vec![0.0, 2.085, 4.171, 6.256]);
    }

    #[test]
    fn keyframes_starting_at_zero_unchanged() {
        let json = r#"{"frames": [
            {"best_effort_timestamp_time": "0.000000"},
            {"best_effort_timestamp_time": "2.0"}
        ]}"#;
        let kf = parse_keyframes(json).unwrap();
        assert_eq!(kf, vec![0.0, 2.0]);
    }

    #[test]
    fn keyframes_empty_output() {
        let kf = parse_keyframes(r#"{"frames": []}"#).unwrap();
        assert!(kf.is_empty());
    }
}
