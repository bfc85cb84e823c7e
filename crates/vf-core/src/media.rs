//! Media-domain enums and the adaptive-bitrate resolution ladder.
//!
//! All enums serialize in lowercase (via `serde(rename_all = "lowercase")`)
//! and implement `Display` manually for consistent string representation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

// ---------------------------------------------------------------------------
// VideoCodec
// ---------------------------------------------------------------------------

/// Video codec families the ladder knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    H265,
}

impl VideoCodec {
    /// ffmpeg encoder name for this codec.
    pub fn encoder(&self) -> &'static str {
        match self {
            Self::H264 => "libx264",
            Self::H265 => "libx265",
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::H264 => write!(f, "h264"),
            Self::H265 => write!(f, "h265"),
        }
    }
}

impl FromStr for VideoCodec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "h264" | "avc" => Ok(Self::H264),
            "h265" | "hevc" => Ok(Self::H265),
            other => Err(Error::Validation(format!("unsupported codec: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Named output resolutions.
///
/// 360p exists in the bitrate ladder but is not an accepted transcode target;
/// [`Resolution::default_bitrate_kbps`] returns `None` for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "2160p")]
    P2160,
}

impl Resolution {
    /// Target frame height in pixels.
    pub fn height(&self) -> u32 {
        match self {
            Self::P360 => 360,
            Self::P480 => 480,
            Self::P720 => 720,
            Self::P1080 => 1080,
            Self::P2160 => 2160,
        }
    }

    /// Default target video bitrate in kbps, or `None` if the resolution is
    /// not an accepted transcode target.
    pub fn default_bitrate_kbps(&self) -> Option<u32> {
        match self {
            Self::P360 => None,
            Self::P480 => Some(1200),
            Self::P720 => Some(2500),
            Self::P1080 => Some(5000),
            Self::P2160 => Some(12000),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}p", self.height())
    }
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "360p" => Ok(Self::P360),
            "480p" => Ok(Self::P480),
            "720p" => Ok(Self::P720),
            "1080p" => Ok(Self::P1080),
            "2160p" => Ok(Self::P2160),
            other => Err(Error::Validation(format!(
                "unsupported resolution: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Bitrate ladder
// ---------------------------------------------------------------------------

/// Allowed bitrates (kbps) per codec family and resolution.
pub fn allowed_bitrates_kbps(codec: VideoCodec, resolution: Resolution) -> &'static [u32] {
    match (codec, resolution) {
        (VideoCodec::H264, Resolution::P360) => &[500, 800],
        (VideoCodec::H264, Resolution::P480) => &[1000, 1500],
        (VideoCodec::H264, Resolution::P720) => &[2500, 3500],
        (VideoCodec::H264, Resolution::P1080) => &[4500, 6000],
        (VideoCodec::H264, Resolution::P2160) => &[12000, 20000],
        (VideoCodec::H265, Resolution::P360) => &[350, 500],
        (VideoCodec::H265, Resolution::P480) => &[700, 1100],
        (VideoCodec::H265, Resolution::P720) => &[1500, 2500],
        (VideoCodec::H265, Resolution::P1080) => &[3000, 4500],
        (VideoCodec::H265, Resolution::P2160) => &[8000, 12000],
    }
}

/// Normalize a caller-supplied bitrate string ("2500k", "2500") to kbps.
pub fn normalize_bitrate(raw: &str) -> Option<u32> {
    let s = raw.trim().to_lowercase();
    let digits = s.strip_suffix('k').unwrap_or(&s);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Validate a caller-supplied bitrate against the ladder.
///
/// An empty string means "no preference" and resolves to the highest allowed
/// value. A value outside the ladder for this codec/resolution is rejected.
pub fn validate_bitrate(
    codec: VideoCodec,
    resolution: Resolution,
    raw: &str,
) -> crate::Result<String> {
    let allowed = allowed_bitrates_kbps(codec, resolution);

    if raw.trim().is_empty() {
        let best = allowed.iter().max().copied().unwrap_or(0);
        return Ok(format!("{best}k"));
    }

    let kbps = normalize_bitrate(raw)
        .ok_or_else(|| Error::Validation(format!("invalid bitrate: {raw}")))?;
    if !allowed.contains(&kbps) {
        return Err(Error::Validation(format!(
            "bitrate {kbps}k not allowed for {codec}/{resolution}"
        )));
    }
    Ok(format!("{kbps}k"))
}

// ---------------------------------------------------------------------------
// PreviewStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a preview encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for PreviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for PreviewStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(Error::Validation(format!(
                "unknown preview status: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_parse_and_display() {
        let res: Resolution = "720p".parse().unwrap();
        assert_eq!(res, Resolution::P720);
        assert_eq!(res.to_string(), "720p");
        assert_eq!(res.height(), 720);
        assert!("999p".parse::<Resolution>().is_err());
    }

    #[test]
    fn default_bitrates() {
        assert_eq!(Resolution::P480.default_bitrate_kbps(), Some(1200));
        assert_eq!(Resolution::P2160.default_bitrate_kbps(), Some(12000));
        assert_eq!(Resolution::P360.default_bitrate_kbps(), None);
    }

    #[test]
    fn codec_parse() {
        assert_eq!("h264".parse::<VideoCodec>().unwrap(), VideoCodec::H264);
        assert_eq!("hevc".parse::<VideoCodec>().unwrap(), VideoCodec::H265);
        assert_eq!(VideoCodec::H264.encoder(), "libx264");
        assert!("vp9".parse::<VideoCodec>().is_err());
    }

    #[test]
    fn normalize_bitrate_forms() {
        assert_eq!(normalize_bitrate("2500k"), Some(2500));
        assert_eq!(normalize_bitrate("2500"), Some(2500));
        assert_eq!(normalize_bitrate(" 2500K "), Some(2500));
        assert_eq!(normalize_bitrate("fast"), None);
        assert_eq!(normalize_bitrate(""), None);
    }

    #[test]
    fn validate_accepts_ladder_value() {
        let b = validate_bitrate(VideoCodec::H264, Resolution::P720, "3500").unwrap();
        assert_eq!(b, "3500k");
    }

    #[test]
    fn validate_rejects_off_ladder_value() {
        let err = validate_bitrate(VideoCodec::H264, Resolution::P720, "1234k");
        assert!(err.is_err());
    }

    #[test]
    fn validate_empty_picks_highest() {
        let b = validate_bitrate(VideoCodec::H265, Resolution::P1080, "").unwrap();
        assert_eq!(b, "4500k");
    }

    #[test]
    fn preview_status_round_trip() {
        for s in ["pending", "processing", "completed", "failed"] {
            let status: PreviewStatus = s.parse().unwrap();
            assert_eq!(status.to_string(), s);
        }
        assert!("done".parse::<PreviewStatus>().is_err());
    }
}
