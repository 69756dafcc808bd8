//! Resource metadata probe.

use crate::error::DownloadError;
use crate::transport::HttpAdapter;
use tracing::info;

/// What the probe learned about the remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceInfo {
    /// Resource size in bytes, `-1` when the server did not report one
    pub total_size: i64,
    /// Whether the server advertises byte-range support
    pub accept_ranges: bool,
}

impl ResourceInfo {
    /// The resource size as `u64`, when known.
    pub fn known_size(&self) -> Option<u64> {
        (self.total_size >= 0).then_some(self.total_size as u64)
    }
}

/// Issue the metadata-only request for `url`.
///
/// Fails fast with [`DownloadError::Probe`] on network failure or a
/// non-success status; there are no retries at this layer.
pub async fn probe(adapter: &dyn HttpAdapter, url: &str) -> Result<ResourceInfo, DownloadError> {
    let response = adapter.probe(url).await.map_err(DownloadError::Probe)?;

    let info = ResourceInfo {
        total_size: response
            .content_length
            .map(|length| length as i64)
            .unwrap_or(-1),
        accept_ranges: response.accept_ranges,
    };

    info!(
        url,
        total_size = info.total_size,
        accept_ranges = info.accept_ranges,
        "probed resource"
    );

    Ok(info)
}
