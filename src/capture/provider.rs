//! Source enumeration
//!
//! Enumeration is delegated to external collaborators rather than native
//! APIs: the encoder binary's device-listing mode on macOS (AVFoundation
//! prints its device table as diagnostics) and `xrandr` on X11. The parsers
//! are pure functions over that diagnostic output.

use crate::encoder::CaptureBackend;
use crate::error::{RecorderError, RecorderResult};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

use super::source::{CaptureSource, SourceBounds, SourceKind};

/// Something that can enumerate capture sources.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// List every source the host currently exposes.
    async fn list_sources(&self) -> RecorderResult<Vec<CaptureSource>>;

    /// Resolve a source id to a live source.
    async fn resolve(&self, id: &str) -> RecorderResult<CaptureSource> {
        self.list_sources()
            .await?
            .into_iter()
            .find(|source| source.id == id)
            .ok_or_else(|| RecorderError::SourceNotFound(id.to_string()))
    }
}

/// Enumerates sources by shelling out to the encoder binary (or `xrandr` on
/// X11) and parsing what it prints.
pub struct DeviceListProvider {
    encoder_path: PathBuf,
    backend: CaptureBackend,
}

impl DeviceListProvider {
    pub fn new(encoder_path: impl Into<PathBuf>, backend: CaptureBackend) -> Self {
        Self {
            encoder_path: encoder_path.into(),
            backend,
        }
    }

    /// Grab a single frame from a source as PNG bytes, for thumbnailing.
    pub async fn thumbnail_png(&self, source: &CaptureSource) -> RecorderResult<Vec<u8>> {
        let mut args: Vec<String> = vec!["-f".into(), self.backend.demuxer().into()];
        args.extend(self.backend.input_args(source, None));
        args.extend(
            [
                "-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "pipe:1",
            ]
            .map(String::from),
        );

        let output = Command::new(&self.encoder_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|e| RecorderError::EncoderUnavailable(e.to_string()))?;

        if !output.status.success() || output.stdout.is_empty() {
            return Err(RecorderError::SourceNotFound(source.id.clone()));
        }
        Ok(output.stdout)
    }

    async fn list_avfoundation(&self) -> RecorderResult<Vec<CaptureSource>> {
        // `-list_devices` always exits non-zero; the device table lands on
        // stderr alongside the usage error.
        let output = Command::new(&self.encoder_path)
            .args(["-hide_banner", "-f", "avfoundation", "-list_devices", "true", "-i", ""])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| RecorderError::EncoderUnavailable(e.to_string()))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(parse_avfoundation_devices(&stderr))
    }

    async fn list_x11(&self) -> RecorderResult<Vec<CaptureSource>> {
        let output = Command::new("xrandr")
            .arg("--listmonitors")
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                Ok(parse_xrandr_monitors(&stdout))
            }
            _ => {
                // No xrandr (headless, Wayland-only, ...): fall back to the
                // whole default display.
                tracing::warn!("xrandr unavailable; exposing the default display only");
                Ok(vec![CaptureSource::screen(0, "Default display")])
            }
        }
    }
}

#[async_trait]
impl SourceProvider for DeviceListProvider {
    async fn list_sources(&self) -> RecorderResult<Vec<CaptureSource>> {
        match self.backend {
            CaptureBackend::AvFoundation => self.list_avfoundation().await,
            CaptureBackend::X11Grab => self.list_x11().await,
            CaptureBackend::GdiGrab => Ok(vec![CaptureSource::screen(0, "Desktop")]),
        }
    }
}

/// Parse the device table AVFoundation prints on stderr, e.g.:
///
/// ```text
/// [AVFoundation indev @ 0x7f9] AVFoundation video devices:
/// [AVFoundation indev @ 0x7f9] [0] FaceTime HD Camera
/// [AVFoundation indev @ 0x7f9] [1] Capture screen 0
/// [AVFoundation indev @ 0x7f9] AVFoundation audio devices:
/// [AVFoundation indev @ 0x7f9] [0] MacBook Pro Microphone
/// ```
pub(crate) fn parse_avfoundation_devices(stderr: &str) -> Vec<CaptureSource> {
    #[derive(PartialEq)]
    enum Section {
        None,
        Video,
        Audio,
    }

    let mut section = Section::None;
    let mut sources = Vec::new();

    for line in stderr.lines() {
        // Strip the `[AVFoundation indev @ ...]` prefix.
        let Some((prefix, rest)) = line.split_once(']') else {
            continue;
        };
        if !prefix.contains("AVFoundation") {
            continue;
        }
        let rest = rest.trim();

        if rest.ends_with("video devices:") {
            section = Section::Video;
            continue;
        }
        if rest.ends_with("audio devices:") {
            section = Section::Audio;
            continue;
        }
        if section == Section::None || !rest.starts_with('[') {
            continue;
        }

        let Some((index, name)) = rest[1..].split_once(']') else {
            continue;
        };
        let Ok(index) = index.trim().parse::<u32>() else {
            continue;
        };
        let name = name.trim().to_string();

        let (kind, prefix) = match section {
            Section::Audio => (SourceKind::Audio, "audio"),
            _ if name.starts_with("Capture screen") => (SourceKind::Screen, "video"),
            _ => (SourceKind::Camera, "video"),
        };

        sources.push(CaptureSource {
            id: format!("{}:{}", prefix, index),
            is_primary: kind == SourceKind::Screen && name.ends_with("screen 0"),
            kind,
            name,
            device_index: index,
            bounds: None,
        });
    }

    sources
}

/// Parse `xrandr --listmonitors` output, e.g.:
///
/// ```text
/// Monitors: 2
///  0: +*eDP-1 1920/344x1080/194+0+0  eDP-1
///  1: +HDMI-1 2560/597x1440/336+1920+0  HDMI-1
/// ```
pub(crate) fn parse_xrandr_monitors(stdout: &str) -> Vec<CaptureSource> {
    let mut sources = Vec::new();

    for line in stdout.lines().skip(1) {
        let mut parts = line.split_whitespace();
        let Some(index) = parts.next().and_then(|p| p.trim_end_matches(':').parse::<u32>().ok())
        else {
            continue;
        };
        let Some(flags) = parts.next() else { continue };
        let Some(geometry) = parts.next() else { continue };
        let name = parts.next().unwrap_or(flags.trim_start_matches(['+', '*']));

        let Some(bounds) = parse_monitor_geometry(geometry) else {
            continue;
        };

        sources.push(CaptureSource {
            id: format!("screen:{}", index),
            kind: SourceKind::Screen,
            name: name.to_string(),
            device_index: index,
            bounds: Some(bounds),
            is_primary: flags.contains('*'),
        });
    }

    sources
}

/// Parse a monitor geometry like `1920/344x1080/194+0+0`.
fn parse_monitor_geometry(geometry: &str) -> Option<SourceBounds> {
    let (size, offsets) = geometry.split_once('+')?;
    let (w, h) = size.split_once('x')?;
    let width = w.split('/').next()?.parse().ok()?;
    let height = h.split('/').next()?.parse().ok()?;
    let (x, y) = offsets.split_once('+')?;

    Some(SourceBounds {
        x: x.parse().ok()?,
        y: y.parse().ok()?,
        width,
        height,
    })
}
