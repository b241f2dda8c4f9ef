//! Encoder command construction
//!
//! Builds the fixed argument vector the external encoder is launched with.
//! The shape mirrors a plain `ffmpeg` screen-capture invocation: input device
//! selection, frame rate, codec/preset/CRF, pixel format, an even-dimension
//! scale filter (H.264 rejects odd sizes), optional audio track, and the
//! destination path.

use crate::capture::CaptureSource;
use crate::recorder::RecorderConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which capture demuxer the encoder should read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureBackend {
    /// macOS AVFoundation
    AvFoundation,
    /// X11 screen grabbing
    X11Grab,
    /// Windows GDI grabbing
    GdiGrab,
}

impl CaptureBackend {
    /// The backend for the compilation target.
    pub fn host_default() -> Self {
        #[cfg(target_os = "macos")]
        {
            Self::AvFoundation
        }
        #[cfg(target_os = "windows")]
        {
            Self::GdiGrab
        }
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            Self::X11Grab
        }
    }

    /// The demuxer name passed to `-f`.
    pub fn demuxer(&self) -> &'static str {
        match self {
            Self::AvFoundation => "avfoundation",
            Self::X11Grab => "x11grab",
            Self::GdiGrab => "gdigrab",
        }
    }

    /// Input-selection arguments for a source, ending with `-i <input>`.
    ///
    /// `audio_index` is only meaningful for AVFoundation, where video and
    /// audio devices are selected in one `video:audio` input string.
    pub fn input_args(&self, source: &CaptureSource, audio_index: Option<u32>) -> Vec<String> {
        match self {
            Self::AvFoundation => {
                let input = match audio_index {
                    Some(audio) => format!("{}:{}", source.device_index, audio),
                    None => source.device_index.to_string(),
                };
                vec!["-i".into(), input]
            }
            Self::X11Grab => {
                let display = std::env::var("DISPLAY").unwrap_or_else(|_| ":0.0".into());
                match source.bounds {
                    Some(bounds) => vec![
                        "-video_size".into(),
                        format!("{}x{}", even(bounds.width), even(bounds.height)),
                        "-i".into(),
                        format!("{}+{},{}", display, bounds.x, bounds.y),
                    ],
                    None => vec!["-i".into(), display],
                }
            }
            Self::GdiGrab => vec!["-i".into(), "desktop".into()],
        }
    }
}

/// Force a pixel dimension down to the nearest even value.
pub fn even(dim: u32) -> u32 {
    dim & !1
}

/// Primary launch or the reduced fallback argument set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchVariant {
    /// Full argument set, audio included when configured.
    Primary,
    /// Retry set used after a crash: no audio track, no mouse-click capture,
    /// no streaming optimizations.
    Fallback,
}

/// A fully resolved encoder invocation.
#[derive(Debug, Clone)]
pub struct EncoderCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl EncoderCommand {
    /// Build the capture invocation for a source and output path.
    pub fn capture(
        config: &RecorderConfig,
        source: &CaptureSource,
        output_path: &Path,
        variant: LaunchVariant,
    ) -> Self {
        let backend = config.backend;
        let include_audio = config.audio.enabled
            && (variant == LaunchVariant::Primary || !config.fallback.drop_audio);

        let mut args: Vec<String> = vec!["-f".into(), backend.demuxer().into()];

        // Cursor options are AVFoundation demuxer options and must precede -i.
        if backend == CaptureBackend::AvFoundation {
            if config.capture_cursor {
                args.extend(["-capture_cursor".into(), "1".into()]);
            }
            if config.capture_mouse_clicks && variant == LaunchVariant::Primary {
                args.extend(["-capture_mouse_clicks".into(), "1".into()]);
            }
        }

        let avf_audio = (backend == CaptureBackend::AvFoundation && include_audio)
            .then_some(config.audio.device_index);
        args.extend(backend.input_args(source, avf_audio));

        // X11 has no combined input string; audio comes from PulseAudio as a
        // second input.
        if backend == CaptureBackend::X11Grab && include_audio {
            args.extend(["-f".into(), "pulse".into(), "-i".into(), "default".into()]);
        }

        args.extend(["-r".into(), config.frame_rate.to_string()]);

        if let Some(bounds) = source.bounds {
            args.extend([
                "-s".into(),
                format!("{}x{}", even(bounds.width), even(bounds.height)),
            ]);
        }

        args.extend([
            "-c:v".into(),
            config.video_codec.clone(),
            "-preset".into(),
            config.preset.clone(),
            "-crf".into(),
            config.crf.to_string(),
            "-pix_fmt".into(),
            config.pixel_format.clone(),
            "-vf".into(),
            "scale=trunc(iw/2)*2:trunc(ih/2)*2".into(),
        ]);

        if include_audio {
            args.extend([
                "-c:a".into(),
                config.audio.codec.clone(),
                "-b:a".into(),
                config.audio.bitrate.clone(),
            ]);
        }

        if variant == LaunchVariant::Primary {
            args.extend(["-movflags".into(), "+faststart".into()]);
        }

        args.push("-y".into());
        args.push(output_path.to_string_lossy().into_owned());

        Self {
            program: config.encoder_path.clone(),
            args,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureSource, SourceBounds};

    fn test_config(backend: CaptureBackend) -> RecorderConfig {
        RecorderConfig {
            backend,
            ..RecorderConfig::default()
        }
    }

    fn screen_one() -> CaptureSource {
        CaptureSource::screen(1, "Capture screen 0")
    }

    #[test]
    fn even_rounds_down() {
        assert_eq!(even(1080), 1080);
        assert_eq!(even(1081), 1080);
        assert_eq!(even(1), 0);
    }

    #[test]
    fn avfoundation_primary_selects_video_and_audio() {
        let config = test_config(CaptureBackend::AvFoundation);
        let cmd = EncoderCommand::capture(
            &config,
            &screen_one(),
            Path::new("/tmp/out.mp4"),
            LaunchVariant::Primary,
        );

        let i = cmd.args.iter().position(|a| a == "-i").expect("-i");
        assert_eq!(cmd.args[i + 1], "1:0");
        assert!(cmd.args.contains(&"-capture_mouse_clicks".to_string()));
        assert!(cmd.args.contains(&"-c:a".to_string()));
        assert!(cmd.args.contains(&"+faststart".to_string()));
        assert_eq!(cmd.args.last().unwrap(), "/tmp/out.mp4");
    }

    #[test]
    fn fallback_drops_audio_and_click_capture() {
        let config = test_config(CaptureBackend::AvFoundation);
        let cmd = EncoderCommand::capture(
            &config,
            &screen_one(),
            Path::new("/tmp/out.mp4"),
            LaunchVariant::Fallback,
        );

        let i = cmd.args.iter().position(|a| a == "-i").expect("-i");
        assert_eq!(cmd.args[i + 1], "1");
        assert!(!cmd.args.contains(&"-c:a".to_string()));
        assert!(!cmd.args.contains(&"-capture_mouse_clicks".to_string()));
        assert!(!cmd.args.contains(&"-movflags".to_string()));
        // Cursor capture and the even-dimension filter survive the fallback.
        assert!(cmd.args.contains(&"-capture_cursor".to_string()));
        assert!(cmd
            .args
            .contains(&"scale=trunc(iw/2)*2:trunc(ih/2)*2".to_string()));
    }

    #[test]
    fn x11_sizes_input_from_bounds() {
        let config = test_config(CaptureBackend::X11Grab);
        let mut source = CaptureSource::screen(0, "eDP-1");
        source.bounds = Some(SourceBounds {
            x: 1920,
            y: 0,
            width: 2561,
            height: 1441,
        });

        let cmd = EncoderCommand::capture(
            &config,
            &source,
            Path::new("/tmp/out.mp4"),
            LaunchVariant::Primary,
        );

        let vs = cmd
            .args
            .iter()
            .position(|a| a == "-video_size")
            .expect("-video_size");
        assert_eq!(cmd.args[vs + 1], "2560x1440");
        let i = cmd.args.iter().position(|a| a == "-i").expect("-i");
        assert!(cmd.args[i + 1].ends_with("+1920,0"));
        // Audio rides on a second pulse input.
        assert!(cmd.args.contains(&"pulse".to_string()));
    }

    #[test]
    fn disabled_audio_never_appears() {
        let mut config = test_config(CaptureBackend::AvFoundation);
        config.audio.enabled = false;

        let cmd = EncoderCommand::capture(
            &config,
            &screen_one(),
            Path::new("/tmp/out.mp4"),
            LaunchVariant::Primary,
        );

        let i = cmd.args.iter().position(|a| a == "-i").expect("-i");
        assert_eq!(cmd.args[i + 1], "1");
        assert!(!cmd.args.contains(&"-c:a".to_string()));
    }
}
