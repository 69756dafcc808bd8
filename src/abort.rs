//! Session abort coordination.
//!
//! A single latch shared between the orchestrator, the scheduler, and
//! every in-flight chunk transfer. Transfers race their I/O against
//! [`AbortSignal::cancelled`], so one `abort` call fans out to all of
//! them without runtime-specific unwinding.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// One-shot abort latch for a download session.
#[derive(Debug, Default)]
pub(crate) struct AbortSignal {
    started: AtomicBool,
    aborted: AtomicBool,
    save_progress: AtomicBool,
    notify: Notify,
}

impl AbortSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Mark the session as started. Returns false if it already was.
    pub(crate) fn mark_started(&self) -> bool {
        !self.started.swap(true, Ordering::SeqCst)
    }

    /// Request an abort, capturing the save-progress decision.
    ///
    /// Idempotent; only the first call after `mark_started` wins and
    /// returns true. Before the session starts this is a no-op.
    pub(crate) fn abort(&self, save_progress: bool) -> bool {
        if !self.started.load(Ordering::SeqCst) {
            return false;
        }
        if self.aborted.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.save_progress.store(save_progress, Ordering::SeqCst);
        self.notify.notify_waiters();
        true
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// The save-progress flag captured at abort time.
    pub(crate) fn saves_progress(&self) -> bool {
        self.save_progress.load(Ordering::SeqCst)
    }

    /// Wait until the session is aborted. Returns immediately if it
    /// already was.
    pub(crate) async fn cancelled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before re-checking the latch so an abort landing in
        // between cannot be missed.
        notified.as_mut().enable();
        if self.is_aborted() {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_before_start_is_noop() {
        let signal = AbortSignal::new();
        assert!(!signal.abort(true));
        assert!(!signal.is_aborted());
    }

    #[test]
    fn test_abort_is_idempotent_and_captures_save_flag() {
        let signal = AbortSignal::new();
        assert!(signal.mark_started());

        assert!(signal.abort(true));
        assert!(signal.is_aborted());
        assert!(signal.saves_progress());

        // A second call must not overwrite the captured decision.
        assert!(!signal.abort(false));
        assert!(signal.saves_progress());
    }

    #[test]
    fn test_mark_started_is_single_use() {
        let signal = AbortSignal::new();
        assert!(signal.mark_started());
        assert!(!signal.mark_started());
    }

    #[tokio::test]
    async fn test_cancelled_returns_after_abort() {
        let signal = std::sync::Arc::new(AbortSignal::new());
        signal.mark_started();

        let waiter = {
            let signal = std::sync::Arc::clone(&signal);
            tokio::spawn(async move { signal.cancelled().await })
        };

        signal.abort(false);
        waiter.await.expect("waiter task panicked");
    }
}
