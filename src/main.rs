//! Command-line front end: enumerate capture sources and drive a recording
//! session from the terminal. Ctrl-C stops the recording.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use quickcap::{
    default_output_path, CaptureSource, DeviceListProvider, RecorderConfig, RecorderEvent,
    RecorderSupervisor, SourceKind, SourceProvider,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Quickcap - minimal screen recording through an external encoder
#[derive(Parser)]
#[command(name = "quickcap")]
#[command(version)]
#[command(about = "Record a screen through an external encoder process", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// List capture sources as JSON
    List,

    /// Record a screen until Ctrl-C
    Record {
        /// Output file path (default: recording-<timestamp>.mp4)
        output: Option<PathBuf>,

        /// Capture source id (default: the primary screen)
        #[arg(long)]
        source: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quickcap=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::List => list().await,
        Commands::Record { output, source } => record(output, source).await,
    }
}

async fn list() -> Result<()> {
    let config = RecorderConfig::default();
    let provider = DeviceListProvider::new(&config.encoder_path, config.backend);
    let sources = provider.list_sources().await?;
    println!("{}", serde_json::to_string_pretty(&sources)?);
    Ok(())
}

async fn record(output: Option<PathBuf>, source_id: Option<String>) -> Result<()> {
    let config = RecorderConfig::default();
    let provider = DeviceListProvider::new(&config.encoder_path, config.backend);

    let source = match source_id {
        Some(id) => provider.resolve(&id).await?,
        None => pick_default_screen(provider.list_sources().await?)?,
    };
    let output =
        output.unwrap_or_else(|| default_output_path(std::path::Path::new(".")));

    let mut recorder = RecorderSupervisor::new(config.clone());
    let mut events = recorder.subscribe();

    let session = recorder
        .start(&source, output)
        .await
        .context("failed to start recording")?;
    println!(
        "recording {} -> {} (Ctrl-C to stop)",
        source.name,
        session.output_path.display()
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for Ctrl-C")?;
    recorder.stop().await.context("failed to stop recording")?;

    // The watcher finishes asynchronously; wait for its verdict.
    let deadline = config.grace_window() + Duration::from_secs(3);
    loop {
        let event = tokio::time::timeout(deadline, events.recv())
            .await
            .context("timed out waiting for the recording to finish")??;
        match event {
            RecorderEvent::Saved { output_path } => {
                println!("saved {}", output_path.display());
                return Ok(());
            }
            RecorderEvent::Failed { message } => bail!("recording failed: {}", message),
            _ => continue,
        }
    }
}

fn pick_default_screen(sources: Vec<CaptureSource>) -> Result<CaptureSource> {
    let mut screens: Vec<CaptureSource> = sources
        .into_iter()
        .filter(|s| s.kind == SourceKind::Screen)
        .collect();
    if screens.is_empty() {
        bail!("no screen capture sources found");
    }
    screens.sort_by_key(|s| !s.is_primary);
    Ok(screens.remove(0))
}
