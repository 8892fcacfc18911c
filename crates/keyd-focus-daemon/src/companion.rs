//! Consumer process running alongside the daemon
//!
//! Optionally starts the pipe's reader (normally `keyd-application-mapper`)
//! as a foreground child at startup and stops it at shutdown. The daemon
//! works the same whether or not the companion is running.

use std::process::ExitStatus;
use std::time::Duration;

use anyhow::{Context, Result};
use keyd_focus_config::CompanionConfig;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};

/// How long the companion gets to exit after SIGTERM before it is killed
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// A running companion process
#[derive(Debug)]
pub struct Companion {
    child: Child,
    command: String,
}

impl Companion {
    /// Start the configured command
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned (e.g. the command
    /// is not on `PATH`).
    pub fn spawn(config: &CompanionConfig) -> Result<Self> {
        let child = Command::new(&config.command)
            .args(&config.args)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start companion `{}`", config.command))?;

        tracing::info!(
            pid = ?child.id(),
            "Started companion: {} {}",
            config.command,
            config.args.join(" ")
        );

        Ok(Self {
            child,
            command: config.command.clone(),
        })
    }

    /// Wait for the companion to exit on its own
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Stop the companion: SIGTERM, then SIGKILL if it lingers
    pub async fn shutdown(mut self) {
        if let Ok(Some(status)) = self.child.try_wait() {
            tracing::debug!("Companion `{}` already exited: {}", self.command, status);
            return;
        }

        if let Some(pid) = self.child.id() {
            let pid = Pid::from_raw(pid as i32);
            if let Err(e) = signal::kill(pid, Signal::SIGTERM) {
                tracing::debug!("Failed to send SIGTERM to companion: {}", e);
            }
        }

        match tokio::time::timeout(TERMINATE_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!("Companion `{}` stopped: {}", self.command, status);
            }
            Ok(Err(e)) => {
                tracing::warn!("Failed to wait for companion `{}`: {}", self.command, e);
            }
            Err(_) => {
                tracing::warn!(
                    "Companion `{}` ignored SIGTERM, killing it",
                    self.command
                );
                if let Err(e) = self.child.kill().await {
                    tracing::warn!("Failed to kill companion `{}`: {}", self.command, e);
                }
            }
        }
    }
}
