//! Destination file preallocation.
//!
//! Chunk transfers write at fixed offsets, so the destination must reach
//! its full length before parallel writers touch it. The file is created
//! (truncating any previous content) and filled sequentially with the
//! configured byte.

use crate::events::{DownloadEvent, EventEmitter};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

const FILL_BUFFER_SIZE: usize = 64 * 1024;

/// Create the destination and fill it to `total_size` bytes.
pub(crate) async fn preallocate(
    dest: &Path,
    total_size: u64,
    fill_byte: u8,
    events: &EventEmitter,
) -> std::io::Result<()> {
    events.emit(&DownloadEvent::ReservingSpaceStarted { size: total_size });
    debug!(path = %dest.display(), total_size, fill_byte, "preallocating destination");

    let mut file = File::create(dest).await?;
    let buffer = vec![fill_byte; FILL_BUFFER_SIZE];
    let mut remaining = total_size;
    while remaining > 0 {
        let len = remaining.min(FILL_BUFFER_SIZE as u64) as usize;
        file.write_all(&buffer[..len]).await?;
        remaining -= len as u64;
    }
    file.flush().await?;

    events.emit(&DownloadEvent::ReservingSpaceFinished { size: total_size });
    Ok(())
}
