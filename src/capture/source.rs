//! Capture source descriptors
//!
//! Platform-agnostic descriptions of the screens, windows, and devices the
//! host exposes for recording. These are read-only views of whatever the
//! enumeration backend reports.

use serde::{Deserialize, Serialize};

/// What kind of thing a capture source is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A whole display
    Screen,
    /// A single application window
    Window,
    /// A camera device
    Camera,
    /// An audio input device
    Audio,
}

/// Pixel bounds of a source, when the backend reports them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceBounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// A capture source enumerated from the host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSource {
    /// Stable identifier, e.g. `video:1` or `screen:0`
    pub id: String,

    /// Source kind
    pub kind: SourceKind,

    /// Human-readable name
    pub name: String,

    /// Device index the encoder uses to select this source
    pub device_index: u32,

    /// Bounds in pixels (if known)
    pub bounds: Option<SourceBounds>,

    /// Whether this is the primary display
    pub is_primary: bool,
}

impl CaptureSource {
    /// Shorthand for a screen source with just an index and name.
    pub fn screen(index: u32, name: impl Into<String>) -> Self {
        Self {
            id: format!("screen:{}", index),
            kind: SourceKind::Screen,
            name: name.into(),
            device_index: index,
            bounds: None,
            is_primary: index == 0,
        }
    }
}
