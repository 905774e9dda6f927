//! Single-consumer sink for background job failures.
//!
//! Any number of [`ErrorReporter`] clones post [`ErrorEvent`]s; one task
//! logs them in arrival order. The sink stops when its handle sends on a
//! separate control channel, never because the error channel ran dry.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::types::ErrorEvent;

/// Where the sink writes each failure.
pub trait JobErrorLog: Send + Sync {
    fn record(&self, event: &ErrorEvent);
}

impl<L> JobErrorLog for Arc<L>
where
    L: JobErrorLog + ?Sized,
{
    fn record(&self, event: &ErrorEvent) {
        (**self).record(event)
    }
}

/// Production log: one `error!` line per failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorLog;

impl JobErrorLog for TracingErrorLog {
    fn record(&self, event: &ErrorEvent) {
        error!(job = event.job, error = %event.error, "background job failed");
    }
}

/// Producer side of the sink. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    tx: mpsc::UnboundedSender<ErrorEvent>,
}

impl ErrorReporter {
    /// Post a failure. Never blocks.
    ///
    /// Once the sink has stopped the event is not logged by the sink; it is
    /// surfaced as a warning instead so it does not vanish silently.
    pub fn report(&self, event: ErrorEvent) {
        if let Err(mpsc::error::SendError(event)) = self.tx.send(event) {
            warn!(job = event.job, error = %event.error, "error sink closed; job error not recorded");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receivers handed back by a stopped sink so the caller decides when they close.
#[derive(Debug)]
pub struct SinkChannels {
    errors: mpsc::UnboundedReceiver<ErrorEvent>,
    done: mpsc::Receiver<()>,
}

impl SinkChannels {
    /// Close the error channel. Events posted after the stop are discarded.
    pub fn close_errors(&mut self) {
        self.errors.close();
        let mut discarded = 0usize;
        while self.errors.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            warn!(discarded, "discarded job errors posted after the error sink stopped");
        }
        debug!("error sink error channel closed");
    }

    pub fn close_done(&mut self) {
        self.done.close();
        debug!("error sink done channel closed");
    }
}

/// Control side of a running sink.
#[derive(Debug)]
pub struct ErrorSinkHandle {
    done: mpsc::Sender<()>,
    join: JoinHandle<SinkChannels>,
}

impl ErrorSinkHandle {
    /// Signal the sink to stop and wait for it to exit.
    ///
    /// Errors already queued when the signal arrives are logged first.
    pub async fn stop(self) -> Result<SinkChannels, tokio::task::JoinError> {
        if self.done.send(()).await.is_err() {
            debug!("error sink already exited before stop signal");
        }
        self.join.await
    }
}

/// The consumer task.
#[derive(Debug)]
pub struct ErrorSink;

impl ErrorSink {
    /// Start the consumer task on the current runtime.
    pub fn spawn<L>(log: L) -> (ErrorReporter, ErrorSinkHandle)
    where
        L: JobErrorLog + 'static,
    {
        let (tx, errors) = mpsc::unbounded_channel();
        let (done_tx, done) = mpsc::channel(1);

        let join = tokio::spawn(sink_loop(log, SinkChannels { errors, done }));

        (
            ErrorReporter { tx },
            ErrorSinkHandle {
                done: done_tx,
                join,
            },
        )
    }
}

async fn sink_loop<L: JobErrorLog>(log: L, mut channels: SinkChannels) -> SinkChannels {
    info!("error sink started");

    loop {
        tokio::select! {
            // Pending errors win over the stop signal so nothing posted before
            // the stop is lost.
            biased;

            Some(event) = channels.errors.recv() => log.record(&event),
            _ = channels.done.recv() => break,
        }
    }

    info!("error sink stopped");
    channels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobError;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct CollectingLog {
        seen: Mutex<Vec<String>>,
    }

    impl CollectingLog {
        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl JobErrorLog for CollectingLog {
        fn record(&self, event: &ErrorEvent) {
            self.seen.lock().unwrap().push(event.to_string());
        }
    }

    fn event(n: usize) -> ErrorEvent {
        ErrorEvent::new("test", JobError::render(format!("failure {n}")))
    }

    #[tokio::test]
    async fn logs_in_arrival_order_and_stops_on_signal() {
        let log = Arc::new(CollectingLog::default());
        let (reporter, handle) = ErrorSink::spawn(log.clone());

        for n in 0..5 {
            reporter.report(event(n));
        }

        let mut channels = handle.stop().await.unwrap();
        channels.close_errors();
        channels.close_done();

        let expected: Vec<String> = (0..5).map(|n| format!("test: render failed: failure {n}")).collect();
        assert_eq!(log.seen(), expected);
        assert!(reporter.is_closed());
    }

    #[tokio::test]
    async fn errors_queued_before_stop_are_not_dropped() {
        let log = Arc::new(CollectingLog::default());
        let (reporter, handle) = ErrorSink::spawn(log.clone());

        // Queue a burst and stop immediately; the stop must not overtake it.
        for n in 0..500 {
            reporter.report(event(n));
        }
        handle.stop().await.unwrap();

        assert_eq!(log.seen().len(), 500);
    }

    #[tokio::test]
    async fn reports_after_close_do_not_reach_the_log() {
        let log = Arc::new(CollectingLog::default());
        let (reporter, handle) = ErrorSink::spawn(log.clone());

        let mut channels = handle.stop().await.unwrap();
        channels.close_errors();

        reporter.report(event(1));
        assert!(log.seen().is_empty());
    }

    #[tokio::test]
    async fn sink_survives_dropped_reporters() {
        let log = Arc::new(CollectingLog::default());
        let (reporter, handle) = ErrorSink::spawn(log.clone());

        reporter.report(event(7));
        drop(reporter);

        handle.stop().await.unwrap();
        assert_eq!(log.seen(), vec!["test: render failed: failure 7".to_string()]);
    }
}
