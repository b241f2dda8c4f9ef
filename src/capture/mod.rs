//! Capture source enumeration
//!
//! The host's screens and devices are discovered through external
//! collaborators (the encoder's device listing, `xrandr`) and exposed as
//! plain descriptors. Nothing here touches native capture APIs.

pub mod provider;
pub mod source;

pub use provider::{DeviceListProvider, SourceProvider};
pub use source::{CaptureSource, SourceBounds, SourceKind};
