//! Failure types reported by background jobs.

use std::path::PathBuf;

use crate::mail::MailError;

/// Failure of a single background job.
///
/// A job error never reaches the HTTP response that spawned the job (that
/// response has usually been written already); it is only observable through
/// the error sink's log output.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("render failed: {0}")]
    Render(String),

    #[error(transparent)]
    Mail(#[from] MailError),

    #[error("store error: {0}")]
    Store(String),
}

impl JobError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }
}

/// A job failure on its way to the error sink.
#[derive(Debug)]
pub struct ErrorEvent {
    /// Name of the job that failed (for log context only).
    pub job: &'static str,
    pub error: JobError,
}

impl ErrorEvent {
    pub fn new(job: &'static str, error: impl Into<JobError>) -> Self {
        Self {
            job,
            error: error.into(),
        }
    }
}

impl core::fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.job, self.error)
    }
}
