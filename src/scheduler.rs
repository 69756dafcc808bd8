//! Bounded-concurrency chunk scheduler.
//!
//! Drives every incomplete chunk through a retry loop with quadratic
//! backoff, at most `concurrency` transfers in flight. The plan stays
//! behind a narrow handle: transfers advance only their own chunk's
//! counter, and aggregation is recomputed on every tick.

use crate::abort::AbortSignal;
use crate::config::backoff_delay;
use crate::error::DownloadError;
use crate::events::{DownloadEvent, EventEmitter};
use crate::plan::{Chunk, DownloadPlan, PlanStore};
use crate::transfer::{transfer_chunk, TransferContext};
use crate::transform::TransformStream;
use crate::transport::HttpAdapter;
use futures_util::{stream, StreamExt};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Progress callback: `(aggregate downloaded, total size, plan)`.
pub type ProgressCallback = Box<dyn Fn(u64, i64, &DownloadPlan) + Send + Sync>;

/// Serialized access to the session's plan.
///
/// Chunk transfers never see the whole plan; they report written byte
/// counts for their own chunk index and the handle recomputes the
/// aggregate under the lock.
#[derive(Debug)]
pub(crate) struct PlanHandle {
    inner: Mutex<DownloadPlan>,
}

/// Snapshot produced by one progress tick.
pub(crate) struct ProgressTick {
    pub chunk: Chunk,
    pub downloaded: u64,
    pub total: i64,
    pub plan: DownloadPlan,
}

impl PlanHandle {
    pub(crate) fn new(plan: DownloadPlan) -> Self {
        Self {
            inner: Mutex::new(plan),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DownloadPlan> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn chunk(&self, index: usize) -> Chunk {
        self.lock().chunks[index]
    }

    pub(crate) fn chunk_count(&self) -> usize {
        self.lock().chunks.len()
    }

    pub(crate) fn incomplete_indices(&self) -> Vec<usize> {
        self.lock().incomplete_indices()
    }

    pub(crate) fn accept_ranges(&self) -> bool {
        self.lock().accept_ranges
    }

    /// Forget partial progress for a chunk that must restart from its
    /// origin (an unsized chunk cannot be range-resumed).
    pub(crate) fn reset_chunk(&self, index: usize) {
        let mut plan = self.lock();
        plan.chunks[index].downloaded = 0;
        plan.touch();
    }

    /// Record `written` bytes for one chunk and return the tick snapshot.
    pub(crate) fn record_write(&self, index: usize, written: u64) -> ProgressTick {
        let mut plan = self.lock();
        plan.chunks[index].downloaded += written;
        plan.touch();
        ProgressTick {
            chunk: plan.chunks[index],
            downloaded: plan.total_downloaded(),
            total: plan.total_size,
            plan: plan.clone(),
        }
    }

    /// Seal an unsized chunk after its stream closed cleanly.
    pub(crate) fn complete_unsized(&self, index: usize) {
        let mut plan = self.lock();
        let chunk = &mut plan.chunks[index];
        if chunk.size.is_none() {
            chunk.size = Some(chunk.downloaded);
        }
        plan.touch();
    }

    pub(crate) fn snapshot(&self) -> DownloadPlan {
        self.lock().clone()
    }
}

/// One scheduling pass over a session's incomplete chunks.
pub(crate) struct Scheduler<'a> {
    pub adapter: &'a dyn HttpAdapter,
    pub url: &'a str,
    pub dest: &'a Path,
    pub transform: Option<&'a Arc<dyn TransformStream>>,
    pub abort: &'a AbortSignal,
    pub events: &'a EventEmitter,
    pub plan: &'a PlanHandle,
    pub store: Option<&'a PlanStore>,
    pub progress: Option<&'a (dyn Fn(u64, i64, &DownloadPlan) + Send + Sync)>,
    pub concurrency: usize,
    pub retry_count: u32,
}

impl Scheduler<'_> {
    /// Run every incomplete chunk to completion or first terminal error.
    ///
    /// On a terminal error the stream is dropped, cancelling whatever is
    /// still in flight.
    pub(crate) async fn run(&self) -> Result<(), DownloadError> {
        let pending = self.plan.incomplete_indices();
        if pending.is_empty() {
            return Ok(());
        }

        debug!(
            pending = pending.len(),
            concurrency = self.concurrency,
            "scheduling chunk transfers"
        );

        let mut transfers = stream::iter(pending)
            .map(|index| self.download_chunk(index))
            .buffer_unordered(self.concurrency);
        while let Some(result) = transfers.next().await {
            result?;
        }
        Ok(())
    }

    async fn download_chunk(&self, index: usize) -> Result<(), DownloadError> {
        let accept_ranges = self.plan.accept_ranges();
        let ctx = TransferContext {
            adapter: self.adapter,
            url: self.url,
            dest: self.dest,
            transform: self.transform,
            abort: self.abort,
            accept_ranges,
            whole_resource: self.plan.chunk_count() == 1,
        };

        let mut attempt = 0u32;
        loop {
            if self.abort.is_aborted() {
                return Err(DownloadError::Cancelled);
            }

            // Full-body transfers (unknown size, or a non-rangeable
            // server) cannot resume mid-chunk; each attempt starts clean.
            let chunk = self.plan.chunk(index);
            if (chunk.size.is_none() || !accept_ranges) && chunk.downloaded > 0 {
                self.plan.reset_chunk(index);
            }
            let chunk = self.plan.chunk(index);
            self.events
                .emit(&DownloadEvent::ChunkStarted { chunk, attempt });

            let mut on_write = |written: u64| self.on_chunk_write(index, written);
            match transfer_chunk(&ctx, chunk, &mut on_write).await {
                Ok(()) => {
                    self.plan.complete_unsized(index);
                    let chunk = self.plan.chunk(index);
                    debug!(offset = chunk.offset, attempt, "chunk transfer finished");
                    self.events
                        .emit(&DownloadEvent::ChunkFinished { chunk, attempt });
                    return Ok(());
                }
                Err(err) => {
                    warn!(
                        offset = chunk.offset,
                        attempt,
                        error = %err,
                        "chunk transfer failed"
                    );
                    self.events.emit(&DownloadEvent::ChunkError {
                        chunk: self.plan.chunk(index),
                        attempt,
                        message: err.to_string(),
                    });

                    if err.is_cancelled() || self.abort.is_aborted() {
                        return Err(DownloadError::Cancelled);
                    }
                    if attempt >= self.retry_count {
                        return Err(DownloadError::ChunkExhausted {
                            offset: chunk.offset,
                            attempts: attempt + 1,
                            source: Box::new(err),
                        });
                    }

                    let delay = backoff_delay(attempt);
                    debug!(delay_ms = delay.as_millis() as u64, "backing off before retry");
                    tokio::select! {
                        biased;
                        _ = self.abort.cancelled() => return Err(DownloadError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    fn on_chunk_write(&self, index: usize, written: u64) {
        let tick = self.plan.record_write(index, written);

        if let Some(store) = self.store {
            if let Err(err) = store.save(&tick.plan) {
                // A missed save costs at most a re-download on resume.
                warn!(error = %err, "failed to persist download plan");
                self.events.emit(&DownloadEvent::Error {
                    url: self.url.to_string(),
                    dest: self.dest.to_path_buf(),
                    message: format!("failed to persist download plan: {err}"),
                });
            }
        }

        self.events
            .emit(&DownloadEvent::ChunkProgress { chunk: tick.chunk });

        if let Some(progress) = self.progress {
            progress(tick.downloaded, tick.total, &tick.plan);
        }
    }
}
