//! Process shutdown sequence.
//!
//! ```text
//! Running ──signal──▶ Draining ──drain()──▶ StoppingWorkers ──▶ Closed
//! ```
//!
//! Background jobs depend on the mail dispatcher and the error sink (a manual
//! job finishes by queueing mail, any job may report an error), so those
//! workers are only told to stop once the coordinator reports zero
//! outstanding work. Channels are closed afterwards in a fixed order: mail
//! input, mail errors, mail done, job errors, job-error-sink done. No consumer
//! has its channel closed before it was told to stop.

use std::future::Future;
use std::time::Duration;

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::jobs::{ErrorSinkHandle, TaskCoordinator};
use crate::mail::MailDispatcherHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Running,
    Draining,
    StoppingWorkers,
    Closed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownOptions {
    /// Upper bound on the drain wait. `None` waits forever.
    ///
    /// When the bound elapses shutdown continues with work still running;
    /// that work is abandoned when the process exits, so mail it would have
    /// sent or files it would have written may be lost.
    pub drain_timeout: Option<Duration>,
}

/// Owns the worker handles and runs the shutdown sequence exactly once.
#[derive(Debug)]
pub struct ShutdownOrchestrator {
    coordinator: TaskCoordinator,
    mail: MailDispatcherHandle,
    errors: ErrorSinkHandle,
    options: ShutdownOptions,
    phase: watch::Sender<ShutdownPhase>,
}

impl ShutdownOrchestrator {
    pub fn new(
        coordinator: TaskCoordinator,
        mail: MailDispatcherHandle,
        errors: ErrorSinkHandle,
        options: ShutdownOptions,
    ) -> Self {
        let (phase, _) = watch::channel(ShutdownPhase::Running);
        Self {
            coordinator,
            mail,
            errors,
            options,
            phase,
        }
    }

    /// Observe phase transitions.
    pub fn subscribe(&self) -> watch::Receiver<ShutdownPhase> {
        self.phase.subscribe()
    }

    /// Wait for SIGINT or SIGTERM, then shut down.
    ///
    /// Fails only if the signal handlers cannot be installed.
    pub async fn run_until_signal(self) -> std::io::Result<()> {
        let signal = wait_for_signal().await?;
        info!(signal, "termination signal received");
        self.shutdown().await;
        Ok(())
    }

    /// Shut down once `trigger` completes.
    pub async fn run_until<F>(self, trigger: F)
    where
        F: Future<Output = ()>,
    {
        trigger.await;
        self.shutdown().await;
    }

    /// Run the full sequence now.
    pub async fn shutdown(self) {
        enter(&self.phase, ShutdownPhase::Draining);
        self.drain().await;

        let Self {
            mail,
            errors,
            phase,
            ..
        } = self;

        enter(&phase, ShutdownPhase::StoppingWorkers);
        let mail = mail.stop().await;
        let errors = errors.stop().await;

        info!("closing channels");
        match mail {
            Ok(mut channels) => {
                channels.close_input();
                channels.close_errors();
                channels.close_done();
            }
            Err(err) => error!(error = %err, "mail dispatcher task failed"),
        }
        match errors {
            Ok(mut channels) => {
                channels.close_errors();
                channels.close_done();
            }
            Err(err) => error!(error = %err, "error sink task failed"),
        }

        enter(&phase, ShutdownPhase::Closed);
    }

    async fn drain(&self) {
        info!(
            outstanding = self.coordinator.outstanding(),
            "waiting for background work"
        );

        match self.options.drain_timeout {
            None => self.coordinator.drain().await,
            Some(limit) => {
                if tokio::time::timeout(limit, self.coordinator.drain())
                    .await
                    .is_err()
                {
                    warn!(
                        outstanding = self.coordinator.outstanding(),
                        timeout = ?limit,
                        "shutdown stalled: drain timed out, abandoning outstanding background work"
                    );
                }
            }
        }
    }
}

fn enter(tx: &watch::Sender<ShutdownPhase>, phase: ShutdownPhase) {
    info!(?phase, "shutdown phase");
    tx.send_replace(phase);
}

/// Resolve on the first SIGINT or SIGTERM, naming the signal.
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            res = signal::ctrl_c() => {
                res?;
                Ok("SIGINT")
            }
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        Ok("ctrl-c")
    }
}
