//! OS process control
//!
//! Pause/resume and termination are coarse, OS-level signals sent to the
//! encoder process: the encoder itself has no pause contract, so output
//! timing across a pause is not frame-accurate. This is a documented
//! limitation, not something to paper over.

use crate::error::{RecorderError, RecorderResult};

/// Signals the supervisor sends to the encoder process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Suspend execution (SIGSTOP)
    Suspend,
    /// Continue execution (SIGCONT)
    Resume,
    /// Ask for a graceful shutdown (SIGTERM)
    Terminate,
    /// Forcefully kill (SIGKILL)
    Kill,
}

/// Seam between the supervisor and the OS, mockable in tests.
pub trait ProcessControl: Send + Sync {
    /// Deliver a signal to a process.
    fn signal(&self, pid: u32, signal: ControlSignal) -> RecorderResult<()>;

    /// Whether the process still exists.
    fn is_alive(&self, pid: u32) -> bool;
}

/// Process control backed by real OS signals.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsProcessControl;

#[cfg(unix)]
impl ProcessControl for OsProcessControl {
    fn signal(&self, pid: u32, signal: ControlSignal) -> RecorderResult<()> {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let sig = match signal {
            ControlSignal::Suspend => Signal::SIGSTOP,
            ControlSignal::Resume => Signal::SIGCONT,
            ControlSignal::Terminate => Signal::SIGTERM,
            ControlSignal::Kill => Signal::SIGKILL,
        };

        signal::kill(Pid::from_raw(pid as i32), sig)
            .map_err(|errno| RecorderError::Io(std::io::Error::from_raw_os_error(errno as i32)))
    }

    fn is_alive(&self, pid: u32) -> bool {
        use nix::sys::signal;
        use nix::unistd::Pid;

        // Signal 0 probes for existence without delivering anything.
        signal::kill(Pid::from_raw(pid as i32), None).is_ok()
    }
}

#[cfg(not(unix))]
impl ProcessControl for OsProcessControl {
    fn signal(&self, _pid: u32, _signal: ControlSignal) -> RecorderResult<()> {
        Err(RecorderError::Unsupported(
            "process signals are only implemented on Unix",
        ))
    }

    fn is_alive(&self, _pid: u32) -> bool {
        false
    }
}
