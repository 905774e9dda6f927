//! Outstanding-work tracking for background jobs.
//!
//! Request handlers hand work to [`TaskCoordinator::spawn`] and return; the
//! job keeps running after the response has been written. Shutdown calls
//! [`TaskCoordinator::drain`], which refuses new work and waits until every
//! accepted job has finished.
//!
//! Every accepted unit of work owns a [`TaskGuard`]. Dropping the guard is the
//! only way the count goes down, so a job that returns early, fails, or
//! panics still releases its slot exactly once.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SpawnError {
    /// Shutdown has started; the work was not accepted.
    #[error("task coordinator is closed")]
    Closed,
}

#[derive(Debug, Default)]
struct Inner {
    outstanding: AtomicUsize,
    closed: AtomicBool,
    idle: Notify,
}

impl Inner {
    fn acquire(&self) -> Result<(), SpawnError> {
        // Count first, then check: a concurrent `drain` either sees this
        // increment or we see its close flag and roll back.
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            self.release();
            return Err(SpawnError::Closed);
        }
        Ok(())
    }

    fn release(&self) {
        let previous = self.outstanding.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "outstanding count released below zero");
        if previous == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Counting join over all in-flight background work.
///
/// Cheap to clone; all clones share one count.
#[derive(Debug, Clone, Default)]
pub struct TaskCoordinator {
    inner: Arc<Inner>,
}

impl TaskCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `job` on the runtime, detached from the caller.
    ///
    /// The returned handle may be dropped; the job keeps running and stays
    /// counted until it completes.
    pub fn spawn<F>(&self, job: F) -> Result<JoinHandle<()>, SpawnError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = self.track()?;
        Ok(tokio::spawn(async move {
            let _guard = guard;
            job.await;
        }))
    }

    /// Register one unit of outstanding work without spawning anything.
    ///
    /// The work stays counted until the returned guard is dropped.
    pub fn track(&self) -> Result<TaskGuard, SpawnError> {
        self.inner.acquire()?;
        Ok(TaskGuard {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Stop accepting new work. Already accepted work is unaffected.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Number of accepted jobs that have not finished yet.
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::SeqCst)
    }

    /// Close the coordinator and wait until no work is outstanding.
    ///
    /// There is no timeout: a job that never finishes keeps this pending
    /// forever. Callers that need a bound wrap it in `tokio::time::timeout`.
    pub async fn drain(&self) {
        self.close();

        loop {
            // Arm the notification before reading the count so a release that
            // lands in between is not missed.
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let outstanding = self.outstanding();
            if outstanding == 0 {
                info!("background work drained");
                return;
            }

            debug!(outstanding, "waiting for background work to finish");
            notified.await;
        }
    }
}

/// One unit of outstanding work; releases its slot on drop.
#[derive(Debug)]
#[must_use = "dropping the guard immediately releases the slot"]
pub struct TaskGuard {
    inner: Arc<Inner>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.inner.release();
    }
}
