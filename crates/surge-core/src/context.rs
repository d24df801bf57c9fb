//! Run context: one clock and one stop signal per run
//!
//! Every component receives an explicit [`RunContext`] handle instead of
//! reading ambient globals. The context pins the shared run-start instant
//! (all scenario offsets and stage boundaries are relative to it) and
//! carries the run-level cancellation signal.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

/// Cloneable handle to the shared run clock and stop signal
#[derive(Clone, Debug)]
pub struct RunContext {
    inner: Arc<Inner>,
    cancel_rx: watch::Receiver<bool>,
}

#[derive(Debug)]
struct Inner {
    started_at: Instant,
    cancel_tx: watch::Sender<bool>,
}

impl RunContext {
    /// Create a fresh context; the run clock starts now
    pub fn new() -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                started_at: Instant::now(),
                cancel_tx,
            }),
            cancel_rx,
        }
    }

    /// Instant the run started
    pub fn started_at(&self) -> Instant {
        self.inner.started_at
    }

    /// Time elapsed since run start
    pub fn elapsed(&self) -> Duration {
        self.inner.started_at.elapsed()
    }

    /// Signal every scheduler and worker holding a clone to stop
    pub fn cancel(&self) {
        debug!("run cancellation requested at {:?}", self.elapsed());
        let _ = self.inner.cancel_tx.send(true);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Resolve once the run is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.cancel_rx.clone();
        // Err means the sender is gone, which only happens at teardown
        let _ = rx.wait_for(|stop| *stop).await;
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_reaches_all_clones() {
        let ctx = RunContext::new();
        let clone = ctx.clone();
        assert!(!clone.is_cancelled());

        ctx.cancel();
        assert!(clone.is_cancelled());
        // already-cancelled contexts resolve immediately
        clone.cancelled().await;
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let ctx = RunContext::new();
        let waiter = ctx.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });

        ctx.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_tracks_run_clock() {
        let ctx = RunContext::new();
        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(ctx.elapsed(), Duration::from_secs(90));
    }
}
