//! # turbodownload
//!
//! A resilient parallel file downloader. A session splits the remote
//! resource into chunks, fetches them with concurrent HTTP range
//! requests, and tracks per-chunk progress in a durable manifest next to
//! the destination file so an interrupted transfer can resume across
//! process restarts.
//!
//! ## Features
//!
//! - **Parallel range requests**: bounded worker pool over fixed-offset
//!   chunks, each written directly into the destination file
//! - **Bounded retries**: per-chunk retry with quadratic backoff
//! - **Resume**: self-describing `<dest>.turbodownload` manifest,
//!   validated against the probed resource before reuse
//! - **Cooperative abort**: with or without saved progress
//! - **Transforms**: an optional byte-stream transform (e.g. encryption)
//!   between network and disk
//! - **Pluggable transport**: swap the HTTP client for an in-memory
//!   adapter in tests
//!
//! ## Quick Start
//!
//! ```no_run
//! use turbodownload::{DownloadConfig, DownloadSession};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DownloadConfig::new(
//!     "http://speedtest.ftp.otenet.gr/files/test100k.db",
//!     "./test100k.db",
//! )
//! .with_chunk_size(4 * 1024 * 1024)
//! .with_concurrency(8);
//!
//! let mut session = DownloadSession::new(config)?;
//! session.on_progress(|downloaded, total, _plan| {
//!     println!("{downloaded}/{total}");
//! });
//! session.download().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`probe`] - metadata request for size and range support
//! - [`plan`] - chunk partitioning and the on-disk manifest
//! - [`config`] - per-session options and retry timing
//! - [`transport`] - the HTTP adapter seam
//! - [`transform`] - caller-supplied byte-stream transforms
//! - [`events`] - emission points observed by the host layer
//! - [`session`] - the orchestrating state machine

#![warn(missing_docs)]
#![warn(clippy::all)]

mod abort;
mod preallocate;
mod scheduler;
mod transfer;

/// CLI command implementations
pub mod cli;

/// Session configuration and retry timing
pub mod config;

/// Error taxonomy
pub mod error;

/// Download event surface
pub mod events;

/// Chunk model and manifest persistence
pub mod plan;

/// Resource metadata probe
pub mod probe;

/// Download session orchestration
pub mod session;

/// Byte-stream transforms
pub mod transform;

/// HTTP transport abstraction
pub mod transport;

pub use config::DownloadConfig;
pub use error::DownloadError;
pub use events::DownloadEvent;
pub use plan::{Chunk, DownloadPlan, PlanStore};
pub use probe::ResourceInfo;
pub use session::{AbortHandle, DownloadSession};
pub use transform::TransformStream;
pub use transport::{HttpAdapter, ReqwestAdapter};
