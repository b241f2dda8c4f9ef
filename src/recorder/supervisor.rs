//! Encoder process supervisor
//!
//! Owns the lifecycle of one external encoder process per recording session:
//! spawn, pause/resume via process suspension, graceful-then-forced stop, and
//! a single fallback relaunch when the encoder crashes mid-session.

use crate::capture::CaptureSource;
use crate::encoder::{probe_encoder, EncoderCommand, LaunchVariant};
use crate::error::{RecorderError, RecorderResult};
use chrono::Utc;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::process::{ControlSignal, OsProcessControl, ProcessControl};
use super::state::{RecorderConfig, RecordingSession, SessionState};

/// Events emitted during a recording session
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    /// Encoder launched, recording in progress
    Started {
        session_id: Uuid,
        output_path: PathBuf,
    },
    /// Encoder suspended
    Paused,
    /// Encoder resumed
    Resumed,
    /// Session ended and the output file is on disk
    Saved { output_path: PathBuf },
    /// Session ended without a usable recording
    Failed { message: String },
}

/// State shared with the exit-watch and grace-kill tasks.
struct Shared {
    state: RwLock<SessionState>,
    session: RwLock<Option<RecordingSession>>,
    started: RwLock<Option<Instant>>,
    /// Consumed by the first crash; `None` afterwards, so a second crash
    /// fails the session instead of retrying again.
    fallback_command: RwLock<Option<EncoderCommand>>,
    control: Box<dyn ProcessControl>,
    event_tx: broadcast::Sender<RecorderEvent>,
}

/// Supervises one recording session at a time.
///
/// The session is an explicit object owned by this supervisor instance, not
/// ambient global state. Transitions are caller-serialized through `&mut
/// self`; the supervisor stays usable after any single session's failure.
pub struct RecorderSupervisor {
    config: RecorderConfig,
    shared: Arc<Shared>,
}

impl RecorderSupervisor {
    /// Create a supervisor driving real OS processes.
    pub fn new(config: RecorderConfig) -> Self {
        Self::with_control(config, Box::new(OsProcessControl))
    }

    /// Create a supervisor with a custom process-control backend.
    pub fn with_control(config: RecorderConfig, control: Box<dyn ProcessControl>) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            config,
            shared: Arc::new(Shared {
                state: RwLock::new(SessionState::Idle),
                session: RwLock::new(None),
                started: RwLock::new(None),
                fallback_command: RwLock::new(None),
                control,
                event_tx,
            }),
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.shared.state.read()
    }

    /// The active session, if any.
    pub fn session(&self) -> Option<RecordingSession> {
        self.shared.session.read().clone()
    }

    /// Wall-clock time since the session started. Keeps ticking across a
    /// pause; signal-level suspension gives no frame-accurate bookkeeping.
    pub fn duration(&self) -> Duration {
        self.shared
            .started
            .read()
            .map(|t| t.elapsed())
            .unwrap_or_default()
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.shared.event_tx.subscribe()
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Start recording a source to `output_path`.
    ///
    /// Fails synchronously when a session is already active, the encoder
    /// binary is unavailable, or the process cannot be spawned.
    pub async fn start(
        &mut self,
        source: &CaptureSource,
        output_path: impl Into<PathBuf>,
    ) -> RecorderResult<RecordingSession> {
        let output_path = output_path.into();
        if *self.shared.state.read() != SessionState::Idle {
            return Err(RecorderError::AlreadyRecording);
        }

        let version = probe_encoder(&self.config.encoder_path).await?;
        tracing::debug!(%version, "encoder available");

        let primary =
            EncoderCommand::capture(&self.config, source, &output_path, LaunchVariant::Primary);
        tracing::info!(
            source = %source.id,
            output = %output_path.display(),
            "starting recording"
        );
        tracing::debug!(args = ?primary.args, "encoder arguments");

        let (child, pid) = spawn_child(&primary)?;

        let session = RecordingSession {
            id: Uuid::new_v4(),
            source_id: source.id.clone(),
            output_path: output_path.clone(),
            started_at: Utc::now(),
            pid,
        };

        *self.shared.session.write() = Some(session.clone());
        *self.shared.started.write() = Some(Instant::now());
        *self.shared.fallback_command.write() = self.config.fallback.enabled.then(|| {
            EncoderCommand::capture(&self.config, source, &output_path, LaunchVariant::Fallback)
        });
        *self.shared.state.write() = SessionState::Recording;

        tokio::spawn(watch(self.shared.clone(), child));

        let _ = self.shared.event_tx.send(RecorderEvent::Started {
            session_id: session.id,
            output_path,
        });
        Ok(session)
    }

    /// Request termination of the active session.
    ///
    /// Sends a graceful terminate and arms a forced kill after the grace
    /// window, then returns; it does not block on process exit. The exit
    /// watcher lands the state back at `Idle` and emits `Saved` or `Failed`.
    pub async fn stop(&mut self) -> RecorderResult<()> {
        let current = *self.shared.state.read();
        if !current.is_active() {
            return Err(RecorderError::NotRecording);
        }
        let pid = self
            .shared
            .session
            .read()
            .as_ref()
            .map(|s| s.pid)
            .ok_or(RecorderError::NotRecording)?;

        tracing::info!(pid, "stopping recording");

        // A suspended encoder cannot handle SIGTERM; wake it first.
        if current == SessionState::Paused {
            let _ = self.shared.control.signal(pid, ControlSignal::Resume);
        }

        *self.shared.state.write() = SessionState::Stopping;

        if let Err(e) = self.shared.control.signal(pid, ControlSignal::Terminate) {
            if self.shared.control.is_alive(pid) {
                return Err(RecorderError::StopFailed(e.to_string()));
            }
            // The pid is already gone; either the watcher is finalizing, or it
            // is mid-relaunch after a crash and will see `Stopping` and
            // terminate the replacement. The grace task below covers both.
        }

        // Re-read the pid when the window elapses: a crash fallback racing
        // this stop may have swapped in a new encoder process.
        let shared = self.shared.clone();
        let grace = self.config.grace_window();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if *shared.state.read() != SessionState::Stopping {
                return;
            }
            let pid = shared.session.read().as_ref().map(|s| s.pid);
            if let Some(pid) = pid {
                if shared.control.is_alive(pid) {
                    tracing::warn!(pid, "grace window elapsed; killing encoder");
                    let _ = shared.control.signal(pid, ControlSignal::Kill);
                }
            }
        });

        Ok(())
    }

    /// Suspend the encoder process.
    pub async fn pause(&mut self) -> RecorderResult<()> {
        match *self.shared.state.read() {
            SessionState::Recording => {}
            SessionState::Paused => return Err(RecorderError::AlreadyPaused),
            _ => return Err(RecorderError::NotRecording),
        }
        let pid = self
            .shared
            .session
            .read()
            .as_ref()
            .map(|s| s.pid)
            .ok_or(RecorderError::NotRecording)?;

        self.shared.control.signal(pid, ControlSignal::Suspend)?;
        *self.shared.state.write() = SessionState::Paused;
        let _ = self.shared.event_tx.send(RecorderEvent::Paused);

        tracing::info!(pid, "recording paused");
        Ok(())
    }

    /// Continue a suspended encoder process.
    pub async fn resume(&mut self) -> RecorderResult<()> {
        match *self.shared.state.read() {
            SessionState::Paused => {}
            SessionState::Recording => return Err(RecorderError::NotPaused),
            _ => return Err(RecorderError::NotRecording),
        }
        let pid = self
            .shared
            .session
            .read()
            .as_ref()
            .map(|s| s.pid)
            .ok_or(RecorderError::NotRecording)?;

        self.shared.control.signal(pid, ControlSignal::Resume)?;
        *self.shared.state.write() = SessionState::Recording;
        let _ = self.shared.event_tx.send(RecorderEvent::Resumed);

        tracing::info!(pid, "recording resumed");
        Ok(())
    }
}

/// Spawn an encoder process with its stderr forwarded to the log.
fn spawn_child(command: &EncoderCommand) -> RecorderResult<(Child, u32)> {
    let mut child = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            RecorderError::LaunchFailed(format!("{}: {}", command.program.display(), e))
        })?;

    let pid = child.id().ok_or_else(|| {
        RecorderError::LaunchFailed("encoder exited before it could be tracked".into())
    })?;

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(target: "quickcap::encoder", "{}", line);
            }
        });
    }

    Ok((child, pid))
}

/// Watch the encoder until the session is over, relaunching once on a crash.
async fn watch(shared: Arc<Shared>, mut child: Child) {
    loop {
        let status = child.wait().await;
        let code = status.as_ref().ok().and_then(|s| s.code());
        let stopping = *shared.state.read() == SessionState::Stopping;
        // 255 is ffmpeg's exit status after SIGTERM; both it and 0 are clean.
        let clean = matches!(code, Some(0) | Some(255));

        if stopping || clean {
            tracing::info!(?code, "encoder exited");
            finalize(&shared).await;
            return;
        }

        let fallback = shared.fallback_command.write().take();
        match fallback {
            Some(command) => {
                tracing::warn!(?code, "encoder crashed; retrying with fallback arguments");
                tracing::debug!(args = ?command.args, "fallback arguments");
                match spawn_child(&command) {
                    Ok((new_child, pid)) => {
                        if let Some(session) = shared.session.write().as_mut() {
                            session.pid = pid;
                        }
                        // A stop may have landed between the crash and this
                        // relaunch, signaling the dead pid. Pass it on so the
                        // replacement is not orphaned.
                        if *shared.state.read() == SessionState::Stopping {
                            tracing::info!(pid, "stop requested during fallback relaunch");
                            let _ = shared.control.signal(pid, ControlSignal::Terminate);
                        }
                        child = new_child;
                    }
                    Err(e) => {
                        fail(&shared, format!("fallback launch failed: {}", e));
                        return;
                    }
                }
            }
            None => {
                let message =
                    RecorderError::EncoderCrashed(format!("exit status {:?}", code)).to_string();
                fail(&shared, message);
                return;
            }
        }
    }
}

/// Land the session back at `Idle` and report whether a file was produced.
async fn finalize(shared: &Arc<Shared>) {
    let output_path = shared
        .session
        .read()
        .as_ref()
        .map(|s| s.output_path.clone());

    let Some(path) = output_path else {
        reset(shared);
        return;
    };

    // Give the container a moment to settle on disk.
    let mut present = path.exists();
    if !present {
        tokio::time::sleep(Duration::from_millis(250)).await;
        present = path.exists();
    }

    reset(shared);

    if present {
        tracing::info!(path = %path.display(), "recording saved");
        let _ = shared
            .event_tx
            .send(RecorderEvent::Saved { output_path: path });
    } else {
        tracing::error!(path = %path.display(), "encoder exited without producing output");
        let _ = shared.event_tx.send(RecorderEvent::Failed {
            message: format!("no output file at {}", path.display()),
        });
    }
}

fn fail(shared: &Shared, message: String) {
    tracing::error!(%message, "recording failed");
    reset(shared);
    let _ = shared.event_tx.send(RecorderEvent::Failed { message });
}

fn reset(shared: &Shared) {
    *shared.state.write() = SessionState::Idle;
    *shared.session.write() = None;
    *shared.started.write() = None;
    *shared.fallback_command.write() = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervisor() -> RecorderSupervisor {
        RecorderSupervisor::new(RecorderConfig::default())
    }

    #[tokio::test]
    async fn stop_without_session_is_an_error_not_a_crash() {
        let mut recorder = supervisor();
        assert!(matches!(
            recorder.stop().await,
            Err(RecorderError::NotRecording)
        ));
        assert_eq!(recorder.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn pause_and_resume_require_an_active_session() {
        let mut recorder = supervisor();
        assert!(matches!(
            recorder.pause().await,
            Err(RecorderError::NotRecording)
        ));
        assert!(matches!(
            recorder.resume().await,
            Err(RecorderError::NotRecording)
        ));
    }

    #[tokio::test]
    async fn idle_supervisor_reports_zero_duration_and_no_session() {
        let recorder = supervisor();
        assert_eq!(recorder.duration(), Duration::ZERO);
        assert!(recorder.session().is_none());
    }
}
