//! Error taxonomy for the download core.

use crate::transport::TransportError;

/// Errors surfaced by a download session.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Invalid configuration, raised before any I/O
    #[error("configuration error: {0}")]
    Config(String),

    /// The metadata probe failed; fatal, never retried
    #[error("probe failed: {0}")]
    Probe(#[source] TransportError),

    /// A chunk transfer failed at the HTTP layer; retryable per chunk
    #[error("transfer error: {0}")]
    Transfer(#[from] TransportError),

    /// A chunk transfer failed at the filesystem layer; retryable per chunk
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The transfer was aborted cooperatively
    #[error("download aborted")]
    Cancelled,

    /// A chunk exhausted its retry budget; terminal for the session
    #[error("chunk at offset {offset} failed after {attempts} attempts: {source}")]
    ChunkExhausted {
        /// Byte offset of the failing chunk
        offset: u64,
        /// Total attempts made (retries + 1)
        attempts: u32,
        /// The last error observed for the chunk
        #[source]
        source: Box<DownloadError>,
    },

    /// `download()` was called on a session that already ran
    #[error("download session already started")]
    AlreadyStarted,
}

impl DownloadError {
    /// Whether this error was produced by a cooperative abort.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DownloadError::Cancelled)
    }
}
