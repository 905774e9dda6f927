//! Background job tracking and failure reporting.
//!
//! ## Components
//!
//! - `TaskCoordinator`: counts in-flight jobs and lets shutdown wait for zero
//! - `ErrorSink`: single consumer that logs failures reported by jobs
//! - `JobError` / `ErrorEvent`: what a failing job reports

pub mod coordinator;
pub mod error_sink;
pub mod types;

pub use coordinator::{SpawnError, TaskCoordinator, TaskGuard};
pub use error_sink::{
    ErrorReporter, ErrorSink, ErrorSinkHandle, JobErrorLog, SinkChannels, TracingErrorLog,
};
pub use types::{ErrorEvent, JobError};
