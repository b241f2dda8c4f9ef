//! Recording state and configuration
//!
//! Defines the session state machine, the per-session record, and the
//! knobs the supervisor is configured with.

use crate::encoder::CaptureBackend;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Current state of a recording session
///
/// `Stopping` is transitional: once the grace-then-kill sequence completes
/// and the output file has been checked, the state always lands back at
/// `Idle`, whatever the encoder's exit code was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No recording in progress
    Idle,
    /// Encoder is running
    Recording,
    /// Encoder is suspended
    Paused,
    /// Termination requested, waiting for the encoder to exit
    Stopping,
}

impl SessionState {
    /// Whether an encoder process is live (possibly suspended).
    pub fn is_active(self) -> bool {
        matches!(self, Self::Recording | Self::Paused)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Idle
    }
}

/// A single recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSession {
    /// Session id
    pub id: Uuid,

    /// Id of the source being captured
    pub source_id: String,

    /// Where the encoder writes the video file
    pub output_path: PathBuf,

    /// When the session started
    pub started_at: DateTime<Utc>,

    /// Pid of the current encoder process
    pub pid: u32,
}

/// Audio track settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioSettings {
    /// Whether to record an audio track at all
    pub enabled: bool,

    /// Audio device index (AVFoundation input selection)
    pub device_index: u32,

    /// Audio codec
    pub codec: String,

    /// Audio bitrate
    pub bitrate: String,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            device_index: 0,
            codec: "aac".into(),
            bitrate: "128k".into(),
        }
    }
}

/// What to do when the encoder exits with a failing code mid-session.
///
/// The retry-without-audio heuristic comes with no documented success
/// criterion, so it is policy rather than hard-wired behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FallbackPolicy {
    /// Attempt one relaunch after a crash
    pub enabled: bool,

    /// Drop the audio track from the relaunch arguments
    pub drop_audio: bool,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            drop_audio: true,
        }
    }
}

/// Supervisor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderConfig {
    /// Path to the encoder binary
    pub encoder_path: PathBuf,

    /// Capture demuxer to record through
    pub backend: CaptureBackend,

    /// Output frame rate
    pub frame_rate: u32,

    /// Video codec
    pub video_codec: String,

    /// Encoder preset
    pub preset: String,

    /// Constant rate factor (quality)
    pub crf: u32,

    /// Output pixel format
    pub pixel_format: String,

    /// Capture the cursor
    pub capture_cursor: bool,

    /// Highlight mouse clicks (AVFoundation only)
    pub capture_mouse_clicks: bool,

    /// Audio track settings
    pub audio: AudioSettings,

    /// Delay between graceful termination and forced kill, in milliseconds
    pub grace_window_ms: u64,

    /// Crash fallback policy
    pub fallback: FallbackPolicy,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            encoder_path: PathBuf::from("ffmpeg"),
            backend: CaptureBackend::host_default(),
            frame_rate: 30,
            video_codec: "libx264".into(),
            preset: "ultrafast".into(),
            crf: 23,
            pixel_format: "yuv420p".into(),
            capture_cursor: true,
            capture_mouse_clicks: true,
            audio: AudioSettings::default(),
            grace_window_ms: 2000,
            fallback: FallbackPolicy::default(),
        }
    }
}

impl RecorderConfig {
    /// The grace window as a [`Duration`].
    pub fn grace_window(&self) -> Duration {
        Duration::from_millis(self.grace_window_ms)
    }
}

/// Default output path: `recording-<timestamp>.mp4` in the given directory,
/// with a filesystem-safe timestamp (no colons).
pub fn default_output_path(dir: &std::path::Path) -> PathBuf {
    let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%S");
    dir.join(format!("recording-{}.mp4", timestamp))
}
