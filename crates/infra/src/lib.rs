//! Infrastructure layer: background work, mail dispatch, shutdown.

pub mod jobs;
pub mod mail;
pub mod shutdown;

pub use jobs::{
    ErrorEvent, ErrorReporter, ErrorSink, ErrorSinkHandle, JobError, JobErrorLog, SinkChannels,
    SpawnError, TaskCoordinator, TaskGuard, TracingErrorLog,
};
pub use mail::{
    Attachment, LogMailer, MailChannels, MailConfig, MailDispatcher, MailDispatcherHandle, MailError, MailQueue,
    Mailer, Message,
};
pub use shutdown::{ShutdownOptions, ShutdownOrchestrator, ShutdownPhase, wait_for_signal};
