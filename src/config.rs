//! Session configuration and retry timing.

use crate::error::DownloadError;
use crate::transform::TransformStream;
use crate::transport::HttpAdapter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default bytes per chunk (16 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 16 * 1024 * 1024;

/// Smallest accepted chunk size.
pub const MIN_CHUNK_SIZE: u64 = 1024;

/// Default number of parallel chunk transfers.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default retries per chunk.
pub const DEFAULT_RETRY_COUNT: u32 = 10;

/// Quadratic backoff before retry `attempt + 1`.
///
/// Attempt indices are zero-based: the delay after the first failure is
/// 1 s, then 4 s, 9 s, and so on.
pub fn backoff_delay(attempt: u32) -> Duration {
    let factor = attempt as u64 + 1;
    Duration::from_millis(1000 * factor * factor)
}

/// Per-session download options.
///
/// Built with `with_*` methods from [`DownloadConfig::new`]; validated by
/// the session before any I/O happens.
#[derive(Clone)]
pub struct DownloadConfig {
    /// Source resource URL
    pub url: String,
    /// Local output path
    pub dest_file: PathBuf,
    /// Bytes per chunk, at least [`MIN_CHUNK_SIZE`]
    pub chunk_size: u64,
    /// Maximum parallel chunk transfers, at least 1
    pub concurrency: usize,
    /// Maximum retries per chunk
    pub retry_count: u32,
    /// Whether the plan manifest is persisted for resume
    pub can_be_resumed: bool,
    /// Byte used to preallocate the destination file
    pub fill_file_byte: u8,
    /// Optional byte-stream transform applied before disk writes
    pub transform: Option<Arc<dyn TransformStream>>,
    /// Pluggable HTTP transport, mainly for testing
    pub adapter: Option<Arc<dyn HttpAdapter>>,
}

impl DownloadConfig {
    /// Create a configuration with defaults for everything but the
    /// source and destination.
    pub fn new(url: impl Into<String>, dest_file: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            dest_file: dest_file.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            retry_count: DEFAULT_RETRY_COUNT,
            can_be_resumed: true,
            fill_file_byte: 0,
            transform: None,
            adapter: None,
        }
    }

    /// Set bytes per chunk.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the maximum number of parallel chunk transfers.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the maximum retries per chunk.
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Enable or disable manifest persistence.
    pub fn with_resume(mut self, can_be_resumed: bool) -> Self {
        self.can_be_resumed = can_be_resumed;
        self
    }

    /// Set the preallocation fill byte.
    pub fn with_fill_byte(mut self, fill_file_byte: u8) -> Self {
        self.fill_file_byte = fill_file_byte;
        self
    }

    /// Attach a byte-stream transform.
    pub fn with_transform(mut self, transform: Arc<dyn TransformStream>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Substitute the HTTP transport.
    pub fn with_adapter(mut self, adapter: Arc<dyn HttpAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Validate option values. Called by the session constructor, before
    /// any I/O.
    pub fn validate(&self) -> Result<(), DownloadError> {
        if self.url.trim().is_empty() {
            return Err(DownloadError::Config("url must not be empty".to_string()));
        }
        let parsed = reqwest::Url::parse(&self.url)
            .map_err(|e| DownloadError::Config(format!("invalid url: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::Config(format!(
                "unsupported url scheme: {}",
                parsed.scheme()
            )));
        }

        if self.dest_file.as_os_str().is_empty() {
            return Err(DownloadError::Config(
                "destination path must not be empty".to_string(),
            ));
        }

        if self.chunk_size < MIN_CHUNK_SIZE {
            return Err(DownloadError::Config(format!(
                "chunk size must be at least {MIN_CHUNK_SIZE} bytes, got {}",
                self.chunk_size
            )));
        }

        if self.concurrency == 0 {
            return Err(DownloadError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

impl std::fmt::Debug for DownloadConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadConfig")
            .field("url", &self.url)
            .field("dest_file", &self.dest_file)
            .field("chunk_size", &self.chunk_size)
            .field("concurrency", &self.concurrency)
            .field("retry_count", &self.retry_count)
            .field("can_be_resumed", &self.can_be_resumed)
            .field("fill_file_byte", &self.fill_file_byte)
            .field("transform", &self.transform.as_ref().map(|_| "<set>"))
            .field("adapter", &self.adapter.as_ref().map(|_| "<set>"))
            .finish()
    }
}
