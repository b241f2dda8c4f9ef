//! End-to-end supervisor tests against fake encoder scripts.
//!
//! Each test materializes a small shell script standing in for ffmpeg: it
//! answers `-version`, writes the output file (the last argument), and reacts
//! to signals the way ffmpeg does (exit 255 on SIGTERM).

#![cfg(unix)]

use quickcap::{
    CaptureBackend, CaptureSource, RecorderConfig, RecorderError, RecorderEvent,
    RecorderSupervisor, SessionState,
};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::time::timeout;

const WELL_BEHAVED: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then
  echo "ffmpeg version 0.0-fake"
  exit 0
fi
for arg in "$@"; do out="$arg"; done
: > "$out"
trap 'exit 255' TERM
while :; do sleep 0.1; done
"#;

const STUBBORN: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then
  exit 0
fi
for arg in "$@"; do out="$arg"; done
: > "$out"
trap '' TERM
while :; do sleep 0.1; done
"#;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

fn crasher_script(dir: &Path, log: &Path) -> PathBuf {
    let body = format!(
        "#!/bin/sh\nif [ \"$1\" = \"-version\" ]; then exit 0; fi\necho \"$@\" >> \"{}\"\nexit 3\n",
        log.display()
    );
    write_script(dir, "crasher", &body)
}

fn config_for(encoder: &Path) -> RecorderConfig {
    RecorderConfig {
        encoder_path: encoder.to_path_buf(),
        // Fixed backend so argument shapes are identical on every host.
        backend: CaptureBackend::AvFoundation,
        grace_window_ms: 500,
        ..RecorderConfig::default()
    }
}

fn screen() -> CaptureSource {
    CaptureSource::screen(1, "Capture screen 0")
}

async fn next_event(events: &mut broadcast::Receiver<RecorderEvent>) -> RecorderEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// Skip intermediate events until the session ends one way or the other.
async fn terminal_event(events: &mut broadcast::Receiver<RecorderEvent>) -> RecorderEvent {
    loop {
        match next_event(events).await {
            event @ (RecorderEvent::Saved { .. } | RecorderEvent::Failed { .. }) => return event,
            _ => continue,
        }
    }
}

#[tokio::test]
async fn start_then_stop_saves_the_output_file() {
    let dir = TempDir::new().unwrap();
    let encoder = write_script(dir.path(), "encoder", WELL_BEHAVED);
    let output = dir.path().join("out.mp4");

    let mut recorder = RecorderSupervisor::new(config_for(&encoder));
    let mut events = recorder.subscribe();

    let session = recorder.start(&screen(), &output).await.unwrap();
    assert_eq!(recorder.state(), SessionState::Recording);
    assert_eq!(session.output_path, output);
    assert!(!session.output_path.as_os_str().is_empty());
    assert!(matches!(
        next_event(&mut events).await,
        RecorderEvent::Started { .. }
    ));

    // Let the fake encoder create its output file.
    tokio::time::sleep(Duration::from_millis(200)).await;

    recorder.stop().await.unwrap();
    let state = recorder.state();
    assert!(
        matches!(state, SessionState::Stopping | SessionState::Idle),
        "unexpected state after stop: {:?}",
        state
    );

    match terminal_event(&mut events).await {
        RecorderEvent::Saved { output_path } => assert_eq!(output_path, output),
        other => panic!("expected Saved, got {:?}", other),
    }
    assert_eq!(recorder.state(), SessionState::Idle);
    assert!(recorder.session().is_none());
    assert!(output.exists());
}

#[tokio::test]
async fn missing_encoder_is_reported_and_leaves_idle() {
    let dir = TempDir::new().unwrap();
    let config = config_for(&dir.path().join("no-such-encoder"));

    let mut recorder = RecorderSupervisor::new(config);
    let err = recorder
        .start(&screen(), dir.path().join("out.mp4"))
        .await
        .unwrap_err();

    assert!(matches!(err, RecorderError::EncoderUnavailable(_)));
    assert_eq!(recorder.state(), SessionState::Idle);
    assert!(recorder.session().is_none());
}

#[tokio::test]
async fn pause_and_resume_keep_the_output_path() {
    let dir = TempDir::new().unwrap();
    let encoder = write_script(dir.path(), "encoder", WELL_BEHAVED);
    let output = dir.path().join("out.mp4");

    let mut recorder = RecorderSupervisor::new(config_for(&encoder));
    let mut events = recorder.subscribe();

    let session = recorder.start(&screen(), &output).await.unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        RecorderEvent::Started { .. }
    ));

    // Not paused yet, so resuming must say so.
    assert!(matches!(
        recorder.resume().await,
        Err(RecorderError::NotPaused)
    ));

    recorder.pause().await.unwrap();
    assert_eq!(recorder.state(), SessionState::Paused);
    assert!(matches!(next_event(&mut events).await, RecorderEvent::Paused));
    assert!(matches!(
        recorder.pause().await,
        Err(RecorderError::AlreadyPaused)
    ));

    recorder.resume().await.unwrap();
    assert_eq!(recorder.state(), SessionState::Recording);
    assert!(matches!(
        next_event(&mut events).await,
        RecorderEvent::Resumed
    ));

    let resumed = recorder.session().expect("session still active");
    assert_eq!(resumed.output_path, session.output_path);
    assert_eq!(resumed.id, session.id);

    recorder.stop().await.unwrap();
    assert!(matches!(
        terminal_event(&mut events).await,
        RecorderEvent::Saved { .. }
    ));
}

#[tokio::test]
async fn crash_triggers_exactly_one_fallback_attempt() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("launches.log");
    let encoder = crasher_script(dir.path(), &log);
    let output = dir.path().join("out.mp4");

    let mut recorder = RecorderSupervisor::new(config_for(&encoder));
    let mut events = recorder.subscribe();

    recorder.start(&screen(), &output).await.unwrap();
    assert!(matches!(
        terminal_event(&mut events).await,
        RecorderEvent::Failed { .. }
    ));
    assert_eq!(recorder.state(), SessionState::Idle);

    let launches = fs::read_to_string(&log).unwrap();
    let lines: Vec<&str> = launches.lines().collect();
    assert_eq!(lines.len(), 2, "expected primary + one fallback: {:?}", lines);
    assert!(lines[0].contains("-c:a"), "primary launch carries audio");
    assert!(!lines[1].contains("-c:a"), "fallback launch drops audio");

    // The supervisor survives the failed session and can start another.
    recorder.start(&screen(), &output).await.unwrap();
    assert!(matches!(
        terminal_event(&mut events).await,
        RecorderEvent::Failed { .. }
    ));
}

#[tokio::test]
async fn disabled_fallback_fails_after_the_first_crash() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("launches.log");
    let encoder = crasher_script(dir.path(), &log);

    let mut config = config_for(&encoder);
    config.fallback.enabled = false;

    let mut recorder = RecorderSupervisor::new(config);
    let mut events = recorder.subscribe();

    recorder
        .start(&screen(), dir.path().join("out.mp4"))
        .await
        .unwrap();
    assert!(matches!(
        terminal_event(&mut events).await,
        RecorderEvent::Failed { .. }
    ));

    let launches = fs::read_to_string(&log).unwrap();
    assert_eq!(launches.lines().count(), 1);
}

/// Script whose first capture launch crashes after a short delay and whose
/// fallback relaunch behaves like a normal encoder.
fn crash_then_recover_script(dir: &Path, log: &Path) -> PathBuf {
    let body = format!(
        r#"#!/bin/sh
if [ "$1" = "-version" ]; then exit 0; fi
echo x >> "{log}"
n=$(wc -l < "{log}")
if [ "$n" -eq 1 ]; then
  sleep 0.15
  exit 3
fi
for arg in "$@"; do out="$arg"; done
: > "$out"
trap 'exit 255' TERM
while :; do sleep 0.1; done
"#,
        log = log.display()
    );
    write_script(dir, "flaky", &body)
}

#[tokio::test]
async fn stop_racing_a_crash_still_lands_idle() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("launches.log");
    let encoder = crash_then_recover_script(dir.path(), &log);
    let output = dir.path().join("out.mp4");

    let mut config = config_for(&encoder);
    config.grace_window_ms = 400;

    let mut recorder = RecorderSupervisor::new(config);
    let mut events = recorder.subscribe();

    recorder.start(&screen(), &output).await.unwrap();

    // Issue the stop right around the moment the primary launch crashes, so
    // it can land before, during, or after the fallback relaunch.
    tokio::time::sleep(Duration::from_millis(150)).await;
    recorder.stop().await.unwrap();

    // Whichever interleaving happened, the session must settle back at Idle
    // within the grace window plus epsilon; no encoder child may be stranded.
    let event = timeout(Duration::from_secs(3), terminal_event(&mut events))
        .await
        .expect("session stranded after stop raced a crash");
    assert!(matches!(
        event,
        RecorderEvent::Saved { .. } | RecorderEvent::Failed { .. }
    ));
    assert_eq!(recorder.state(), SessionState::Idle);
    assert!(recorder.session().is_none());
}

#[tokio::test]
async fn stubborn_encoder_is_killed_within_the_grace_window() {
    let dir = TempDir::new().unwrap();
    let encoder = write_script(dir.path(), "encoder", STUBBORN);
    let output = dir.path().join("out.mp4");

    let mut config = config_for(&encoder);
    config.grace_window_ms = 300;

    let mut recorder = RecorderSupervisor::new(config);
    let mut events = recorder.subscribe();

    recorder.start(&screen(), &output).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let stop_requested = Instant::now();
    recorder.stop().await.unwrap();

    // SIGTERM is ignored; the kill after the grace window must still land the
    // session back at Idle, and the partial output file counts as saved.
    let event = timeout(Duration::from_secs(3), terminal_event(&mut events))
        .await
        .expect("session did not settle after the grace window");
    assert!(matches!(event, RecorderEvent::Saved { .. }));
    assert!(stop_requested.elapsed() >= Duration::from_millis(300));
    assert_eq!(recorder.state(), SessionState::Idle);
}
