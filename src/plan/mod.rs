//! Download plan: chunk partitioning and per-chunk progress.

mod store;

pub use store::{PlanStore, PlanStoreError};

use crate::probe::ResourceInfo;
use serde::{Deserialize, Serialize};

/// Current manifest schema version.
const SCHEMA_VERSION: &str = "1.0.0";

/// A contiguous byte range of the resource assigned to one worker.
///
/// `offset` is the absolute byte position in both the resource and the
/// destination file. `size` is `None` for the single chunk of an
/// unknown-size resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Absolute byte offset of the chunk
    pub offset: u64,
    /// Total byte length, absent when the resource size is unknown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Bytes successfully written for this chunk so far
    pub downloaded: u64,
}

impl Chunk {
    /// Bytes still to transfer, unknown for an unsized chunk.
    pub fn remaining(&self) -> Option<u64> {
        self.size.map(|size| size.saturating_sub(self.downloaded))
    }

    /// Whether every byte of the chunk has been written.
    pub fn is_complete(&self) -> bool {
        self.size.is_some_and(|size| self.downloaded >= size)
    }

    /// Absolute file position where the next byte lands.
    pub fn write_position(&self) -> u64 {
        self.offset + self.downloaded
    }
}

/// The durable description of a transfer: resource identity plus the
/// ordered, non-overlapping chunks covering it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadPlan {
    schema_version: String,
    /// Resource size in bytes, `-1` when unknown
    pub total_size: i64,
    /// Whether the server advertised byte-range support at plan time
    pub accept_ranges: bool,
    /// Ordered chunks partitioning the resource
    pub chunks: Vec<Chunk>,
    created_at: i64,
    updated_at: i64,
}

impl DownloadPlan {
    /// Partition the probed resource into chunks of `chunk_size` bytes.
    ///
    /// A known-size, range-accepting resource gets `ceil(total / chunk_size)`
    /// chunks with the remainder in the last one. A resource without range
    /// support gets one full-size chunk; an unknown-size resource gets one
    /// unsized chunk.
    pub fn build(info: &ResourceInfo, chunk_size: u64) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let chunks = match (info.total_size, info.accept_ranges) {
            (total, true) if total >= 0 => {
                let total = total as u64;
                let mut chunks = Vec::with_capacity(total.div_ceil(chunk_size).max(1) as usize);
                let mut offset = 0u64;
                while offset < total {
                    let size = chunk_size.min(total - offset);
                    chunks.push(Chunk {
                        offset,
                        size: Some(size),
                        downloaded: 0,
                    });
                    offset += size;
                }
                if chunks.is_empty() {
                    // Zero-byte resource still needs one chunk to drive
                    // preallocation and completion.
                    chunks.push(Chunk {
                        offset: 0,
                        size: Some(0),
                        downloaded: 0,
                    });
                }
                chunks
            }
            (total, false) if total >= 0 => vec![Chunk {
                offset: 0,
                size: Some(total as u64),
                downloaded: 0,
            }],
            _ => vec![Chunk {
                offset: 0,
                size: None,
                downloaded: 0,
            }],
        };

        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            total_size: info.total_size,
            accept_ranges: info.accept_ranges,
            chunks,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the on-disk plan identity matches the current probe.
    pub fn matches(&self, info: &ResourceInfo) -> bool {
        self.total_size == info.total_size && self.accept_ranges == info.accept_ranges
    }

    /// Whether every chunk has been fully transferred.
    pub fn is_complete(&self) -> bool {
        self.chunks.iter().all(Chunk::is_complete)
    }

    /// Aggregate bytes written across all chunks.
    pub fn total_downloaded(&self) -> u64 {
        self.chunks.iter().map(|chunk| chunk.downloaded).sum()
    }

    /// Indices of chunks that still need work, in offset order.
    pub fn incomplete_indices(&self) -> Vec<usize> {
        self.chunks
            .iter()
            .enumerate()
            .filter(|(_, chunk)| !chunk.is_complete())
            .map(|(index, _)| index)
            .collect()
    }

    /// Validate the manifest schema version.
    pub(crate) fn schema_matches(&self) -> bool {
        self.schema_version == SCHEMA_VERSION
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }
}
