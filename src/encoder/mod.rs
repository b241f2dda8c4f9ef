//! External encoder integration
//!
//! The encoder is an external binary (ffmpeg) invoked with a fixed argument
//! list; this module builds those arguments and checks that the binary is
//! actually runnable before a session depends on it.

pub mod command;

pub use command::{even, CaptureBackend, EncoderCommand, LaunchVariant};

use crate::error::{RecorderError, RecorderResult};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Check that the encoder binary exists and runs, returning its version line.
pub async fn probe_encoder(program: &Path) -> RecorderResult<String> {
    let output = Command::new(program)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await
        .map_err(|e| {
            RecorderError::EncoderUnavailable(format!("{}: {}", program.display(), e))
        })?;

    if !output.status.success() {
        return Err(RecorderError::EncoderUnavailable(format!(
            "{} exited with {}",
            program.display(),
            output.status
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().next().unwrap_or_default().to_string())
}
