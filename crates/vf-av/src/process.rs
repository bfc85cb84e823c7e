//! OS-level control of encoder processes.
//!
//! The supervisor throttles a streaming encoder by stopping and continuing
//! its process, and escalates to a forced kill on inactivity or override.
//! On non-Unix targets suspend/resume are unavailable and report an error.

#[cfg(unix)]
mod imp {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    fn pid(raw: u32) -> Pid {
        Pid::from_raw(raw as i32)
    }

    /// Stop (pause) a process.
    pub fn suspend(raw: u32) -> vf_core::Result<()> {
        kill(pid(raw), Signal::SIGSTOP)
            .map_err(|e| vf_core::Error::Internal(format!("SIGSTOP pid {raw}: {e}")))
    }

    /// Continue a stopped process.
    pub fn resume(raw: u32) -> vf_core::Result<()> {
        kill(pid(raw), Signal::SIGCONT)
            .map_err(|e| vf_core::Error::Internal(format!("SIGCONT pid {raw}: {e}")))
    }

    /// Forcibly kill a process. Works on stopped processes too.
    pub fn force_kill(raw: u32) -> vf_core::Result<()> {
        kill(pid(raw), Signal::SIGKILL)
            .map_err(|e| vf_core::Error::Internal(format!("SIGKILL pid {raw}: {e}")))
    }

    /// Whether a process with this pid currently exists.
    pub fn is_alive(raw: u32) -> bool {
        kill(pid(raw), None).is_ok()
    }
}

#[cfg(not(unix))]
mod imp {
    pub fn suspend(_raw: u32) -> vf_core::Result<()> {
        Err(vf_core::Error::Internal(
            "process suspension is only supported on unix".into(),
        ))
    }

    pub fn resume(_raw: u32) -> vf_core::Result<()> {
        Err(vf_core::Error::Internal(
            "process resumption is only supported on unix".into(),
        ))
    }

    pub fn force_kill(_raw: u32) -> vf_core::Result<()> {
        Err(vf_core::Error::Internal(
            "force kill is only supported on unix".into(),
        ))
    }

    pub fn is_alive(_raw: u32) -> bool {
        false
    }
}

pub use imp::{force_kill, is_alive, resume, suspend};
