//! HTTP transport abstraction.
//!
//! The download core talks to the network through the [`HttpAdapter`] trait
//! so tests can substitute an in-memory transport. The default
//! [`ReqwestAdapter`] wraps a shared [`reqwest::Client`] configured with a
//! 30 second idle timeout and standard redirect handling.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, RANGE};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Idle timeout applied to pooled connections.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Streaming response body: post-decode bytes as they arrive off the wire.
pub type BodyStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// An inclusive byte range for a ranged GET.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte requested
    pub start: u64,
    /// Last byte requested (inclusive)
    pub end: u64,
}

impl std::fmt::Display for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bytes={}-{}", self.start, self.end)
    }
}

/// Result of a metadata probe request.
#[derive(Debug, Clone, Copy)]
pub struct ProbeResponse {
    /// Value of the content-length header, if present
    pub content_length: Option<u64>,
    /// Whether the server advertises byte-range support
    pub accept_ranges: bool,
}

/// Result of a GET request.
pub struct FetchResponse {
    /// True iff the server answered 206 Partial Content
    pub ranged: bool,
    /// The streaming body
    pub body: BodyStream,
}

/// Transport-level failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Request construction or send failure
    #[error("request failed: {0}")]
    Request(String),

    /// Non-success HTTP status
    #[error("unexpected status {status} for {url}")]
    Status {
        /// The HTTP status code received
        status: u16,
        /// The request URL
        url: String,
    },

    /// Body stream failure mid-transfer
    #[error("body stream error: {0}")]
    Body(String),

    /// The server answered a ranged request with a full 200 body
    #[error("server ignored range request and returned a full response")]
    RangeIgnored,
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            TransportError::Status {
                status: status.as_u16(),
                url: err
                    .url()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| "<unknown>".to_string()),
            }
        } else if err.is_body() || err.is_decode() {
            TransportError::Body(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// Pluggable HTTP transport used by the probe and by chunk transfers.
#[async_trait]
pub trait HttpAdapter: Send + Sync {
    /// Issue a metadata-only request (HEAD semantics) for `url`.
    async fn probe(&self, url: &str) -> Result<ProbeResponse, TransportError>;

    /// Issue a GET for `url`, ranged when `range` is given.
    async fn fetch(
        &self,
        url: &str,
        range: Option<ByteRange>,
    ) -> Result<FetchResponse, TransportError>;
}

/// Default transport backed by [`reqwest`].
pub struct ReqwestAdapter {
    client: Client,
}

impl ReqwestAdapter {
    /// Build an adapter with the standard client configuration.
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self { client })
    }

    /// Build an adapter around an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpAdapter for ReqwestAdapter {
    async fn probe(&self, url: &str) -> Result<ProbeResponse, TransportError> {
        let response = self.client.head(url).send().await?.error_for_status()?;

        let accept_ranges = response
            .headers()
            .get(ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("bytes"))
            .unwrap_or(false);

        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        debug!(
            url,
            ?content_length,
            accept_ranges,
            "probe response received"
        );

        Ok(ProbeResponse {
            content_length,
            accept_ranges,
        })
    }

    async fn fetch(
        &self,
        url: &str,
        range: Option<ByteRange>,
    ) -> Result<FetchResponse, TransportError> {
        let mut request = self.client.get(url);
        if let Some(range) = range {
            request = request.header(RANGE, range.to_string());
        }

        let response = request.send().await?.error_for_status()?;
        let ranged = response.status() == StatusCode::PARTIAL_CONTENT;

        Ok(FetchResponse {
            ranged,
            body: response
                .bytes_stream()
                .map_err(TransportError::from)
                .boxed(),
        })
    }
}
