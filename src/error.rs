//! Error types and handling
//!
//! Common error types used across the crate. Every failure is surfaced to the
//! caller as a value; none of them tear down the host process.

use thiserror::Error;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("capture source not found: {0}")]
    SourceNotFound(String),

    #[error("encoder unavailable: {0}")]
    EncoderUnavailable(String),

    #[error("failed to launch encoder: {0}")]
    LaunchFailed(String),

    #[error("encoder crashed: {0}")]
    EncoderCrashed(String),

    #[error("failed to stop encoder: {0}")]
    StopFailed(String),

    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("no recording in progress")]
    NotRecording,

    #[error("recording is already paused")]
    AlreadyPaused,

    #[error("recording is not paused")]
    NotPaused,

    #[error("not supported on this platform: {0}")]
    Unsupported(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using RecorderError
pub type RecorderResult<T> = Result<T, RecorderError>;
