//! Single chunk transfer.
//!
//! One ranged GET streamed through the optional transform into the
//! destination file at the chunk's offset. Every await races the session
//! abort latch, so a cancelled transfer rejects promptly and leaves the
//! chunk's `downloaded` counter at its last written value.

use crate::abort::AbortSignal;
use crate::error::DownloadError;
use crate::plan::Chunk;
use crate::transform::TransformStream;
use crate::transport::{ByteRange, HttpAdapter, TransportError};
use futures_util::StreamExt;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tracing::{debug, trace};

/// Shared inputs for every transfer of one session.
pub(crate) struct TransferContext<'a> {
    pub adapter: &'a dyn HttpAdapter,
    pub url: &'a str,
    pub dest: &'a Path,
    pub transform: Option<&'a Arc<dyn TransformStream>>,
    pub abort: &'a AbortSignal,
    /// Whether the plan was built against a range-accepting server.
    /// Without range support the sole chunk is fetched with a plain
    /// full-body GET and restarted from its origin on every attempt.
    pub accept_ranges: bool,
    /// True when the chunk spans the entire resource from offset zero,
    /// in which case a full 200 response is byte-equivalent to the
    /// requested range.
    pub whole_resource: bool,
}

/// Transfer the remaining bytes of `chunk` into the destination file.
///
/// `on_write` is invoked once per post-transform buffer with the number
/// of bytes just written; the scheduler uses it to advance the chunk
/// counter, persist the plan, and report aggregate progress.
pub(crate) async fn transfer_chunk(
    ctx: &TransferContext<'_>,
    chunk: Chunk,
    on_write: &mut (dyn FnMut(u64) + Send),
) -> Result<(), DownloadError> {
    if ctx.abort.is_aborted() {
        return Err(DownloadError::Cancelled);
    }

    if chunk.remaining() == Some(0) {
        return Ok(());
    }

    let (range, write_position) = match chunk.remaining() {
        Some(remaining) if ctx.accept_ranges => {
            let start = chunk.write_position();
            (
                Some(ByteRange {
                    start,
                    end: start + remaining - 1,
                }),
                start,
            )
        }
        // Non-rangeable or unknown size: request the whole resource and
        // write from the chunk's origin; the scheduler resets
        // `downloaded` beforehand.
        _ => (None, chunk.offset),
    };

    debug!(
        offset = chunk.offset,
        downloaded = chunk.downloaded,
        range = ?range,
        "starting chunk transfer"
    );

    let response = tokio::select! {
        biased;
        _ = ctx.abort.cancelled() => return Err(DownloadError::Cancelled),
        response = ctx.adapter.fetch(ctx.url, range) => response?,
    };

    if range.is_some() && !response.ranged && !(write_position == 0 && ctx.whole_resource) {
        // A 200 body would start at byte zero and run past the end of
        // this chunk's region, clobbering its neighbors.
        return Err(TransportError::RangeIgnored.into());
    }

    let mut body = match ctx.transform {
        Some(transform) => transform.transform(response.body),
        None => response.body,
    };

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .open(ctx.dest)
        .await?;
    file.seek(SeekFrom::Start(write_position)).await?;

    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.abort.cancelled() => return Err(DownloadError::Cancelled),
            next = body.next() => next,
        };

        match next {
            Some(Ok(buffer)) => {
                file.write_all(&buffer).await?;
                trace!(offset = chunk.offset, len = buffer.len(), "wrote buffer");
                on_write(buffer.len() as u64);
            }
            Some(Err(err)) => return Err(err.into()),
            None => break,
        }
    }

    file.flush().await?;
    Ok(())
}
