//! quickcap - minimal screen recording through an external encoder.
//!
//! Pick a capture source, hand it to the [`RecorderSupervisor`], and it
//! spawns and supervises one ffmpeg process for the session: pause/resume via
//! OS process suspension, graceful-then-forced stop, and a single no-audio
//! fallback relaunch if the encoder crashes. Lifecycle notifications go out
//! over a broadcast channel.

pub mod capture;
pub mod encoder;
pub mod error;
pub mod recorder;

pub use capture::{CaptureSource, DeviceListProvider, SourceKind, SourceProvider};
pub use encoder::{CaptureBackend, EncoderCommand};
pub use error::{RecorderError, RecorderResult};
pub use recorder::{
    default_output_path, RecorderConfig, RecorderEvent, RecorderSupervisor, RecordingSession,
    SessionState,
};
