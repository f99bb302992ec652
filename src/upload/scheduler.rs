//! Delayed re-delivery of retry intents on the tokio runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::debug;

use super::types::{RetryScheduler, ScheduledRetry};
use crate::pool::{KeyPoolHandle, WeakKeyPoolHandle};

/// Sleeps for the retry delay, then submits the intent to the pool worker.
///
/// `shutdown` cancels every pending retry and makes later
/// `schedule_retry` calls no-ops. The scheduler holds only a weak handle:
/// it lives inside the worker it feeds, so it must not keep that worker's
/// channel open.
pub struct TokioRetryScheduler {
    sink: WeakKeyPoolHandle,
    runtime: Handle,
    stopped: Arc<AtomicBool>,
    cancel: Arc<Notify>,
}

impl TokioRetryScheduler {
    /// Must be called from within a tokio runtime.
    pub fn new(sink: &KeyPoolHandle) -> Self {
        Self::with_runtime(sink, Handle::current())
    }

    pub fn with_runtime(sink: &KeyPoolHandle, runtime: Handle) -> Self {
        Self {
            sink: sink.downgrade(),
            runtime,
            stopped: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(Notify::new()),
        }
    }

    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.cancel.notify_waiters();
    }

    pub fn is_shut_down(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl RetryScheduler for TokioRetryScheduler {
    fn schedule_retry(&self, retry: ScheduledRetry) {
        if self.is_shut_down() {
            debug!("scheduler shut down, dropping retry");
            return;
        }
        let sink = self.sink.clone();
        let stopped = self.stopped.clone();
        let cancel = self.cancel.clone();
        self.runtime.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(retry.delay) => {
                    if stopped.load(Ordering::SeqCst) {
                        return;
                    }
                    let delivered = sink
                        .upgrade()
                        .is_some_and(|sink| sink.submit(retry.intent));
                    if !delivered {
                        debug!(attempt = retry.attempt, "pool worker gone, retry dropped");
                    }
                }
                _ = cancel.notified() => {}
            }
        });
    }
}

impl Drop for TokioRetryScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
