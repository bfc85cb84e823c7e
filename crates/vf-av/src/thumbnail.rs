//! Single-frame thumbnail extraction.

use std::path::Path;
use std::time::Duration;

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

const THUMBNAIL_TIMEOUT: Duration = Duration::from_secs(60);

/// Grab one frame from `input` at `at_seconds` and write it to `output`.
///
/// The output format follows the file extension (`.jpg` in practice).
pub async fn extract_thumbnail(
    tools: &ToolRegistry,
    input: &Path,
    output: &Path,
    at_seconds: f64,
) -> vf_core::Result<()> {
    let ffmpeg = tools.require("ffmpeg")?;
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut cmd = ToolCommand::new(ffmpeg.path.clone());
    cmd.timeout(THUMBNAIL_TIMEOUT);
    cmd.args(["-y", "-ss"]);
    cmd.arg(format!("{at_seconds}"));
    cmd.arg("-i");
    cmd.arg(input.to_string_lossy().as_ref());
    cmd.args(["-frames:v", "1"]);
    cmd.arg(output.to_string_lossy().as_ref());

    cmd.execute().await?;
    Ok(())
}
