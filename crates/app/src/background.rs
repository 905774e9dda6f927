//! Fire-and-forget work on behalf of a workflow.
//!
//! Every job goes through the [`TaskCoordinator`] so shutdown waits for it,
//! and every failure goes to the error sink because nobody is left to return
//! it to.

use std::future::Future;

use subscriptions_infra::{
    ErrorEvent, ErrorReporter, JobError, MailQueue, Message, SpawnError, TaskCoordinator,
};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Background {
    coordinator: TaskCoordinator,
    errors: ErrorReporter,
    mail: MailQueue,
}

impl Background {
    pub fn new(coordinator: TaskCoordinator, errors: ErrorReporter, mail: MailQueue) -> Self {
        Self {
            coordinator,
            errors,
            mail,
        }
    }

    pub fn mail(&self) -> &MailQueue {
        &self.mail
    }

    /// Run `job` in the background; an `Err` is reported under `name`.
    pub fn spawn<F>(&self, name: &'static str, job: F) -> Result<(), SpawnError>
    where
        F: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        let errors = self.errors.clone();
        self.coordinator.spawn(async move {
            if let Err(err) = job.await {
                errors.report(ErrorEvent::new(name, err));
            } else {
                debug!(job = name, "background job finished");
            }
        })?;
        Ok(())
    }

    /// Queue `message` without waiting for space in the mail queue.
    pub fn send_mail(&self, name: &'static str, message: Message) -> Result<(), SpawnError> {
        let mail = self.mail.clone();
        self.spawn(name, async move { Ok(mail.send(message).await?) })
    }
}
