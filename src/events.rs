//! Download event surface.
//!
//! Events are a pure observer pattern: components emit at well-defined
//! points and subscribers registered on the session receive each event
//! synchronously. A panicking subscriber is caught and logged so it can
//! never interrupt a transfer.

use crate::plan::{Chunk, DownloadPlan};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

/// Events emitted over the lifetime of a download session.
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    /// The session entered the probing state
    Started {
        /// Source URL
        url: String,
        /// Destination path
        dest: PathBuf,
    },
    /// The download completed and the manifest was removed
    Finished {
        /// Source URL
        url: String,
        /// Destination path
        dest: PathBuf,
    },
    /// The session hit a fatal error, or a plan save failed
    Error {
        /// Source URL
        url: String,
        /// Destination path
        dest: PathBuf,
        /// Human-readable failure description
        message: String,
    },
    /// A chunk transfer attempt is starting
    ChunkStarted {
        /// Snapshot of the chunk at dispatch time
        chunk: Chunk,
        /// Zero-based attempt index
        attempt: u32,
    },
    /// A post-transform buffer was written for a chunk
    ChunkProgress {
        /// Snapshot of the chunk after the write
        chunk: Chunk,
    },
    /// A chunk transfer attempt completed successfully
    ChunkFinished {
        /// Snapshot of the completed chunk
        chunk: Chunk,
        /// Zero-based attempt index that succeeded
        attempt: u32,
    },
    /// A chunk transfer attempt failed
    ChunkError {
        /// Snapshot of the chunk at failure time
        chunk: Chunk,
        /// Zero-based attempt index that failed
        attempt: u32,
        /// Failure description
        message: String,
    },
    /// The plan was loaded or created and scheduling is about to begin
    PlanReady {
        /// The plan that will drive the transfer
        plan: DownloadPlan,
    },
    /// The session was aborted
    Aborted,
    /// Destination preallocation is starting
    ReservingSpaceStarted {
        /// Total bytes to reserve
        size: u64,
    },
    /// Destination preallocation finished
    ReservingSpaceFinished {
        /// Total bytes reserved
        size: u64,
    },
}

type Subscriber = std::sync::Arc<dyn Fn(&DownloadEvent) + Send + Sync>;

/// Fan-out point for [`DownloadEvent`] emissions.
#[derive(Default)]
pub struct EventEmitter {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl EventEmitter {
    /// Create an emitter with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber callback.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&DownloadEvent) + Send + Sync + 'static,
    {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            return;
        };
        subscribers.push(std::sync::Arc::new(callback));
    }

    /// Emit an event to every subscriber, swallowing subscriber panics.
    ///
    /// Subscribers are invoked outside the registry lock, so a callback
    /// may itself trigger further emissions (an abort, say) safely.
    pub fn emit(&self, event: &DownloadEvent) {
        let subscribers: Vec<Subscriber> = {
            let Ok(guard) = self.subscribers.lock() else {
                return;
            };
            guard.clone()
        };
        for subscriber in subscribers {
            if catch_unwind(AssertUnwindSafe(|| subscriber(event))).is_err() {
                warn!(event = ?event, "event subscriber panicked");
            }
        }
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.subscribers.lock().map(|s| s.len()).unwrap_or(0);
        f.debug_struct("EventEmitter")
            .field("subscribers", &count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_emit_reaches_all_subscribers() {
        let emitter = EventEmitter::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let count = Arc::clone(&count);
            emitter.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        emitter.emit(&DownloadEvent::Aborted);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_panicking_subscriber_does_not_stop_emission() {
        let emitter = EventEmitter::new();
        let reached = Arc::new(AtomicUsize::new(0));

        emitter.subscribe(|_| panic!("subscriber bug"));
        {
            let reached = Arc::clone(&reached);
            emitter.subscribe(move |_| {
                reached.fetch_add(1, Ordering::SeqCst);
            });
        }

        emitter.emit(&DownloadEvent::Aborted);
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }
}
