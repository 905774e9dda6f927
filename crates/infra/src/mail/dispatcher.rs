//! Mail dispatch worker.
//!
//! Handlers push messages into a bounded [`MailQueue`]; one dispatcher task
//! pulls them off and sends each on its own task so a slow transport never
//! blocks the queue. A message counts as outstanding work in the
//! [`TaskCoordinator`] from the moment it is queued until its send attempt
//! finishes, so draining the coordinator also drains the mail queue.
//!
//! Send failures travel back to the dispatcher over a dedicated error channel
//! and are recorded there through a [`JobErrorLog`] (by default
//! [`TracingErrorLog`]).

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::mailer::{MailConfig, MailError, Mailer};
use super::message::Message;
use crate::jobs::{ErrorEvent, JobErrorLog, TaskCoordinator, TaskGuard, TracingErrorLog};

/// Job name failed sends are recorded under.
const MAIL_JOB: &str = "mail";

/// A message plus the slot it holds in the coordinator.
#[derive(Debug)]
pub struct Queued {
    message: Message,
    guard: TaskGuard,
}

/// Producer side of the mail queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MailQueue {
    tx: mpsc::Sender<Queued>,
    coordinator: TaskCoordinator,
}

impl MailQueue {
    /// Queue a message for delivery.
    ///
    /// Waits if the queue is full. Fails once shutdown has begun.
    pub async fn send(&self, message: Message) -> Result<(), MailError> {
        let guard = self
            .coordinator
            .track()
            .map_err(|_| MailError::QueueClosed)?;

        self.tx
            .send(Queued { message, guard })
            .await
            .map_err(|_| MailError::QueueClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receivers handed back by a stopped dispatcher, closed by the caller in
/// shutdown order.
#[derive(Debug)]
pub struct MailChannels {
    input: mpsc::Receiver<Queued>,
    errors: mpsc::UnboundedReceiver<MailError>,
    done: mpsc::Receiver<()>,
}

impl MailChannels {
    pub fn close_input(&mut self) {
        self.input.close();
        while let Ok(queued) = self.input.try_recv() {
            warn!(to = %queued.message.to, subject = %queued.message.subject, "dropping undelivered mail at shutdown");
        }
        debug!("mail input channel closed");
    }

    pub fn close_errors(&mut self) {
        self.errors.close();
        while let Ok(err) = self.errors.try_recv() {
            error!(error = %err, "mail error reported after dispatcher stopped");
        }
        debug!("mail error channel closed");
    }

    pub fn close_done(&mut self) {
        self.done.close();
        debug!("mail done channel closed");
    }
}

/// Control side of a running dispatcher.
#[derive(Debug)]
pub struct MailDispatcherHandle {
    done: mpsc::Sender<()>,
    join: JoinHandle<MailChannels>,
}

impl MailDispatcherHandle {
    /// Signal the dispatcher to stop and wait for it to exit.
    ///
    /// Call only after the coordinator has drained; messages still queued at
    /// that point would never be sent.
    pub async fn stop(self) -> Result<MailChannels, tokio::task::JoinError> {
        if self.done.send(()).await.is_err() {
            debug!("mail dispatcher already exited before stop signal");
        }
        self.join.await
    }
}

/// Single consumer of the mail queue.
pub struct MailDispatcher {
    mailer: Arc<dyn Mailer>,
    config: MailConfig,
    failures: Arc<dyn JobErrorLog>,
}

impl MailDispatcher {
    pub fn new(mailer: Arc<dyn Mailer>, config: MailConfig) -> Self {
        Self {
            mailer,
            config,
            failures: Arc::new(TracingErrorLog),
        }
    }

    /// Record delivery failures somewhere other than the tracing log.
    pub fn with_failure_log(mut self, log: Arc<dyn JobErrorLog>) -> Self {
        self.failures = log;
        self
    }

    /// Start the dispatcher task on the current runtime.
    pub fn spawn(self, coordinator: TaskCoordinator) -> (MailQueue, MailDispatcherHandle) {
        let (tx, input) = mpsc::channel(self.config.queue_size.max(1));
        let (error_tx, errors) = mpsc::unbounded_channel();
        let (done_tx, done) = mpsc::channel(1);

        let channels = MailChannels {
            input,
            errors,
            done,
        };
        let join = tokio::spawn(self.run(channels, error_tx));

        (
            MailQueue { tx, coordinator },
            MailDispatcherHandle {
                done: done_tx,
                join,
            },
        )
    }

    async fn run(
        self,
        mut channels: MailChannels,
        error_tx: mpsc::UnboundedSender<MailError>,
    ) -> MailChannels {
        info!(host = %self.config.host, port = self.config.port, "mail dispatcher started");

        loop {
            tokio::select! {
                biased;

                Some(err) = channels.errors.recv() => {
                    self.failures.record(&ErrorEvent::new(MAIL_JOB, err));
                }
                Some(queued) = channels.input.recv() => {
                    self.dispatch(queued, error_tx.clone());
                }
                _ = channels.done.recv() => break,
            }
        }

        info!("mail dispatcher stopped");
        channels
    }

    fn dispatch(&self, queued: Queued, error_tx: mpsc::UnboundedSender<MailError>) {
        let Queued { mut message, guard } = queued;
        if message.from.is_empty() {
            message.from = self.config.from_address.clone();
        }
        if message.from_name.is_empty() {
            message.from_name = self.config.from_name.clone();
        }

        let mailer = Arc::clone(&self.mailer);
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(err) = mailer.send(&message).await {
                // The dispatcher may already be gone; the error is logged
                // either by it or by `close_errors`.
                let _ = error_tx.send(err);
            }
        });
    }
}
