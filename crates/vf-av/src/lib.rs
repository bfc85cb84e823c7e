//! vf-av: the external-tool layer of the videoflix transcoding backend.
//!
//! Everything that shells out to ffmpeg/ffprobe lives here: source probing
//! and keyframe extraction, playlist synthesis, one-shot segment encodes,
//! the supervised continuous encoder, preview encodes, and thumbnail
//! extraction — plus the filesystem lockfiles that serialize writers per
//! output directory.

pub mod cleanup;
pub mod command;
pub mod continuous;
pub mod locks;
pub mod playlist;
pub mod preview;
pub mod probe;
pub mod process;
pub mod segment;
pub mod thumbnail;
pub mod tools;

pub use command::{ToolCommand, ToolOutput};
pub use continuous::{kill_continuous, run_continuous, ContinuousOutcome, ContinuousRequest};
pub use locks::{ContinuousLock, LockRegistry};
pub use probe::SourceProbe;
pub use segment::{AudioMode, EncodeParams};
pub use tools::{ToolInfo, ToolRegistry};
