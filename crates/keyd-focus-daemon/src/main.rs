//! keyd-focus daemon
//!
//! Follows window focus in the niri compositor and writes one line per
//! change to keyd's `keyd.fifo`, where `keyd-application-mapper` picks it up.

mod companion;
mod niri_ipc;
mod pipe;
mod protocol;
mod source;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use keyd_focus_config::{CompanionConfig, LogLevel, DEFAULT_CONFIG_PATH};
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::EnvFilter;

use crate::companion::Companion;
use crate::niri_ipc::{
    HostNotification, NiriEventDispatcher, WindowTracker, DEFAULT_CHANNEL_BUFFER,
};
use crate::pipe::PipeChannel;
use crate::source::FocusEventSource;

#[derive(Parser, Debug)]
#[command(name = "keyd-focusd")]
#[command(about = "Forward window focus changes to keyd's application mapper")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Write to this pipe instead of the configured one
    #[arg(short, long)]
    pipe: Option<PathBuf>,

    /// Do not start the configured companion process
    #[arg(long)]
    no_companion: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Expand tilde in config path
    let config_path: PathBuf = shellexpand::tilde(&args.config).into_owned().into();
    let config = keyd_focus_config::load_config(&config_path)?;

    init_tracing(config.global.log_level);

    if config_path.exists() {
        tracing::info!("Loaded configuration from {}", config_path.display());
    } else {
        tracing::info!(
            "No configuration at {}, using defaults",
            config_path.display()
        );
    }

    let pipe_path = args.pipe.unwrap_or_else(|| config.pipe.resolve_path());
    tracing::info!("Writing focus events to {}", pipe_path.display());

    pipe::prepare_fifo(&pipe_path);
    let (mut channel, mut completions) = PipeChannel::new(pipe_path);
    channel.open_async();
    let mut source = FocusEventSource::new(channel);

    let mut companion = match &config.companion {
        Some(companion_config) if !args.no_companion => start_companion(companion_config),
        _ => None,
    };

    let (dispatcher, mut events) = NiriEventDispatcher::new(DEFAULT_CHANNEL_BUFFER);
    let mut reader = match dispatcher.spawn_reader().await {
        Ok(reader) => reader,
        Err(e) => {
            stop_companion(companion).await;
            return Err(e.into());
        }
    };

    let mut tracker = WindowTracker::default();
    let mut sigterm = signal(SignalKind::terminate())?;

    tracing::info!("keyd-focus daemon running");

    let result = loop {
        tokio::select! {
            Some(completion) = completions.recv() => {
                source.channel_mut().finish_open(completion);
            }
            Some(event) = events.recv() => {
                match tracker.apply(event) {
                    Some(HostNotification::FocusChanged) => source.on_focus_changed(&tracker),
                    Some(HostNotification::SystemModalOpened) => {
                        source.on_system_modal_opened(&tracker)
                    }
                    None => {}
                }
            }
            finished = &mut reader => {
                break match finished {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(anyhow::Error::new(e).context("Lost the niri event stream")),
                    Err(e) => Err(anyhow::Error::new(e).context("Niri event reader panicked")),
                };
            }
            status = wait_companion(&mut companion) => {
                match status {
                    Ok(status) => tracing::warn!("Companion exited: {}", status),
                    Err(e) => tracing::warn!("Failed to wait for companion: {}", e),
                }
                companion = None;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received interrupt, shutting down...");
                break Ok(());
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, shutting down...");
                break Ok(());
            }
        }
    };

    reader.abort();
    stop_companion(companion).await;

    let channel = source.channel_mut();
    tracing::debug!(
        status = ?channel.status(),
        open_attempts = channel.open_attempts(),
        "Closing pipe {}",
        channel.path().display()
    );

    result
}

fn init_tracing(level: LogLevel) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter())),
        )
        .init();
}

fn start_companion(config: &CompanionConfig) -> Option<Companion> {
    match Companion::spawn(config) {
        Ok(companion) => Some(companion),
        Err(e) => {
            tracing::warn!("{:#}", e);
            None
        }
    }
}

async fn stop_companion(companion: Option<Companion>) {
    if let Some(companion) = companion {
        companion.shutdown().await;
    }
}

/// Resolves when the companion exits; never resolves without one
async fn wait_companion(
    companion: &mut Option<Companion>,
) -> std::io::Result<std::process::ExitStatus> {
    match companion {
        Some(companion) => companion.wait().await,
        None => std::future::pending().await,
    }
}
