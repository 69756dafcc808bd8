//! Download session orchestration.
//!
//! The session owns the top-level state machine: probe, load-or-create
//! the plan, preallocate on a fresh plan, schedule chunk transfers, and
//! finalize. A session runs at most once.

use crate::abort::AbortSignal;
use crate::config::DownloadConfig;
use crate::error::DownloadError;
use crate::events::{DownloadEvent, EventEmitter};
use crate::plan::{DownloadPlan, PlanStore};
use crate::preallocate::preallocate;
use crate::probe::probe;
use crate::scheduler::{PlanHandle, ProgressCallback, Scheduler};
use crate::transport::{HttpAdapter, ReqwestAdapter};
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};

/// Cloneable handle that aborts a running session from another task.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    signal: Arc<AbortSignal>,
    events: Arc<EventEmitter>,
}

impl AbortHandle {
    /// Request an abort. Idempotent; a no-op before the session starts.
    ///
    /// With `save_progress` the manifest and destination survive for a
    /// later resume; without it both are removed during finalization.
    pub fn abort(&self, save_progress: bool) {
        if self.signal.abort(save_progress) {
            info!(save_progress, "abort requested");
            self.events.emit(&DownloadEvent::Aborted);
        }
    }
}

/// A single-use download of one URL to one destination path.
pub struct DownloadSession {
    config: DownloadConfig,
    adapter: Arc<dyn HttpAdapter>,
    events: Arc<EventEmitter>,
    progress: Option<ProgressCallback>,
    abort: Arc<AbortSignal>,
}

impl DownloadSession {
    /// Validate the configuration and build a session.
    ///
    /// Configuration problems surface here, before any I/O.
    pub fn new(config: DownloadConfig) -> Result<Self, DownloadError> {
        config.validate()?;
        let adapter: Arc<dyn HttpAdapter> = match &config.adapter {
            Some(adapter) => Arc::clone(adapter),
            None => Arc::new(ReqwestAdapter::new()?),
        };
        Ok(Self {
            config,
            adapter,
            events: Arc::new(EventEmitter::new()),
            progress: None,
            abort: Arc::new(AbortSignal::new()),
        })
    }

    /// Register an event subscriber.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&DownloadEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(callback);
    }

    /// Register the progress callback, invoked as
    /// `(aggregate downloaded, total size, plan)` on every written buffer.
    pub fn on_progress<F>(&mut self, callback: F)
    where
        F: Fn(u64, i64, &DownloadPlan) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(callback));
    }

    /// Handle for aborting this session from elsewhere.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            signal: Arc::clone(&self.abort),
            events: Arc::clone(&self.events),
        }
    }

    /// Request an abort on this session. See [`AbortHandle::abort`].
    pub fn abort(&self, save_progress: bool) {
        self.abort_handle().abort(save_progress);
    }

    /// Run the download to completion.
    ///
    /// Resolves `Ok` on success and on a clean abort; fails with the
    /// first terminal error otherwise. Calling this a second time on the
    /// same session returns [`DownloadError::AlreadyStarted`].
    pub async fn download(&self) -> Result<(), DownloadError> {
        if !self.abort.mark_started() {
            return Err(DownloadError::AlreadyStarted);
        }

        let span = tracing::info_span!(
            "download",
            url = %self.config.url,
            dest = %self.config.dest_file.display()
        );
        async {
            info!("starting download");
            self.events.emit(&DownloadEvent::Started {
                url: self.config.url.clone(),
                dest: self.config.dest_file.clone(),
            });

            let store = PlanStore::for_destination(&self.config.dest_file);
            let result = self.run(&store).await;
            self.finalize(&store, result).await
        }
        .instrument(span)
        .await
    }

    async fn run(&self, store: &PlanStore) -> Result<(), DownloadError> {
        let info = probe(self.adapter.as_ref(), &self.config.url).await?;

        let loaded = if self.config.can_be_resumed {
            store.load(&info)
        } else {
            None
        };
        let is_new = loaded.is_none();
        let plan = loaded.unwrap_or_else(|| DownloadPlan::build(&info, self.config.chunk_size));

        info!(
            chunks = plan.chunks.len(),
            total_size = plan.total_size,
            resumed = !is_new,
            "download plan ready"
        );
        self.events
            .emit(&DownloadEvent::PlanReady { plan: plan.clone() });

        if is_new {
            if let Some(total) = info.known_size() {
                preallocate(
                    &self.config.dest_file,
                    total,
                    self.config.fill_file_byte,
                    &self.events,
                )
                .await?;
            }
        }

        let handle = PlanHandle::new(plan);
        let scheduler = Scheduler {
            adapter: self.adapter.as_ref(),
            url: &self.config.url,
            dest: &self.config.dest_file,
            transform: self.config.transform.as_ref(),
            abort: &self.abort,
            events: &self.events,
            plan: &handle,
            store: self.config.can_be_resumed.then_some(store),
            progress: self.progress.as_deref(),
            concurrency: self.config.concurrency,
            retry_count: self.config.retry_count,
        };
        scheduler.run().await
    }

    async fn finalize(
        &self,
        store: &PlanStore,
        result: Result<(), DownloadError>,
    ) -> Result<(), DownloadError> {
        if self.abort.is_aborted() {
            if self.abort.saves_progress() {
                info!("aborted, keeping manifest and destination for resume");
            } else {
                store.delete();
                match tokio::fs::remove_file(&self.config.dest_file).await {
                    Ok(()) => {}
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => {
                        warn!(error = %err, "failed to remove destination after abort")
                    }
                }
                info!("aborted without saving progress, removed manifest and destination");
            }

            // An abort on its own resolves cleanly; only a genuine
            // terminal error that raced the abort is re-raised.
            return match result {
                Err(err) if !err.is_cancelled() => {
                    self.emit_error(&err);
                    Err(err)
                }
                _ => Ok(()),
            };
        }

        match result {
            Ok(()) => {
                store.delete();
                info!("download finished");
                self.events.emit(&DownloadEvent::Finished {
                    url: self.config.url.clone(),
                    dest: self.config.dest_file.clone(),
                });
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "download failed");
                self.emit_error(&err);
                if !self.config.can_be_resumed {
                    store.delete();
                }
                Err(err)
            }
        }
    }

    fn emit_error(&self, err: &DownloadError) {
        self.events.emit(&DownloadEvent::Error {
            url: self.config.url.clone(),
            dest: self.config.dest_file.clone(),
            message: err.to_string(),
        });
    }
}
