//! Recording session supervision
//!
//! This module implements the session lifecycle around an external encoder
//! process:
//! - SessionState machine and per-session bookkeeping
//! - ProcessControl seam for OS-level signals
//! - RecorderSupervisor orchestrating start/stop/pause/resume

pub mod process;
pub mod state;
pub mod supervisor;

pub use process::{ControlSignal, OsProcessControl, ProcessControl};
pub use state::{
    default_output_path, AudioSettings, FallbackPolicy, RecorderConfig, RecordingSession,
    SessionState,
};
pub use supervisor::{RecorderEvent, RecorderSupervisor};
