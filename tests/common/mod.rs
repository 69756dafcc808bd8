//! Shared test fixtures: an in-memory HTTP adapter with failure
//! injection and concurrency accounting, plus a simple byte transform.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use turbodownload::transport::{
    BodyStream, ByteRange, FetchResponse, HttpAdapter, ProbeResponse, TransportError,
};
use turbodownload::TransformStream;

/// Deterministic pseudo-random payload of `len` bytes.
pub fn test_content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i.wrapping_mul(31) ^ (i >> 8)) as u8).collect()
}

#[derive(Default)]
struct ActiveCounter {
    current: AtomicUsize,
    high_water: AtomicUsize,
}

struct ActiveGuard {
    counter: Arc<ActiveCounter>,
}

impl ActiveGuard {
    fn new(counter: Arc<ActiveCounter>) -> Self {
        let current = counter.current.fetch_add(1, Ordering::SeqCst) + 1;
        counter.high_water.fetch_max(current, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.counter.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory [`HttpAdapter`] serving a fixed payload.
pub struct MockAdapter {
    content: Vec<u8>,
    accept_ranges: bool,
    report_length: bool,
    ignore_range: bool,
    fail_next_fetches: AtomicU32,
    fail_all: bool,
    fail_offset: Option<u64>,
    fail_stream_after: Option<usize>,
    fail_streams_remaining: AtomicU32,
    io_chunk: usize,
    stream_delay: Option<Duration>,
    fetch_calls: AtomicU32,
    active: Arc<ActiveCounter>,
}

impl MockAdapter {
    pub fn new(content: Vec<u8>) -> Self {
        Self {
            content,
            accept_ranges: true,
            report_length: true,
            ignore_range: false,
            fail_next_fetches: AtomicU32::new(0),
            fail_all: false,
            fail_offset: None,
            fail_stream_after: None,
            fail_streams_remaining: AtomicU32::new(0),
            io_chunk: 1024,
            stream_delay: None,
            fetch_calls: AtomicU32::new(0),
            active: Arc::new(ActiveCounter::default()),
        }
    }

    /// Server does not advertise byte-range support.
    pub fn without_ranges(mut self) -> Self {
        self.accept_ranges = false;
        self
    }

    /// Server omits the content-length header.
    pub fn without_length(mut self) -> Self {
        self.report_length = false;
        self
    }

    /// Server answers ranged requests with a full 200 body.
    pub fn ignoring_range(mut self) -> Self {
        self.ignore_range = true;
        self
    }

    /// Fail the next `count` fetch calls with a network error.
    pub fn failing_next(self, count: u32) -> Self {
        self.fail_next_fetches.store(count, Ordering::SeqCst);
        self
    }

    /// Fail every fetch call.
    pub fn failing_always(mut self) -> Self {
        self.fail_all = true;
        self
    }

    /// Fail every fetch whose range starts at `offset`.
    pub fn failing_offset(mut self, offset: u64) -> Self {
        self.fail_offset = Some(offset);
        self
    }

    /// For the next `times` fetches, deliver `bytes` body bytes and then
    /// fail the stream mid-transfer (a dropped connection).
    pub fn failing_stream_after(mut self, bytes: usize, times: u32) -> Self {
        self.fail_stream_after = Some(bytes);
        self.fail_streams_remaining.store(times, Ordering::SeqCst);
        self
    }

    /// Emit the body in buffers of `len` bytes.
    pub fn io_chunk(mut self, len: usize) -> Self {
        self.io_chunk = len;
        self
    }

    /// Sleep between emitted buffers so transfers overlap in time.
    pub fn stream_delay(mut self, delay: Duration) -> Self {
        self.stream_delay = Some(delay);
        self
    }

    /// Number of fetch calls made so far.
    pub fn fetch_calls(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Highest number of concurrently active body streams observed.
    pub fn high_water(&self) -> usize {
        self.active.high_water.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpAdapter for MockAdapter {
    async fn probe(&self, _url: &str) -> Result<ProbeResponse, TransportError> {
        Ok(ProbeResponse {
            content_length: self.report_length.then_some(self.content.len() as u64),
            accept_ranges: self.accept_ranges,
        })
    }

    async fn fetch(
        &self,
        _url: &str,
        range: Option<ByteRange>,
    ) -> Result<FetchResponse, TransportError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_all {
            return Err(TransportError::Request(
                "simulated network failure".to_string(),
            ));
        }
        if self
            .fail_next_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(TransportError::Request(
                "simulated transient failure".to_string(),
            ));
        }
        if let (Some(fail_offset), Some(range)) = (self.fail_offset, range) {
            if range.start == fail_offset {
                return Err(TransportError::Request(
                    "simulated per-offset failure".to_string(),
                ));
            }
        }

        let (slice, ranged) = match range {
            Some(range) if !self.ignore_range => {
                let start = (range.start as usize).min(self.content.len());
                let end = ((range.end + 1) as usize).min(self.content.len());
                (self.content[start..end].to_vec(), true)
            }
            _ => (self.content.clone(), false),
        };

        let truncate_at = self.fail_stream_after.filter(|_| {
            self.fail_streams_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        });

        let guard = ActiveGuard::new(Arc::clone(&self.active));
        let keep = truncate_at.map_or(slice.len(), |bytes| bytes.min(slice.len()));
        let mut items: VecDeque<Result<Bytes, TransportError>> = slice[..keep]
            .chunks(self.io_chunk.max(1))
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        if truncate_at.is_some() {
            items.push_back(Err(TransportError::Body(
                "simulated mid-stream failure".to_string(),
            )));
        }

        let delay = self.stream_delay;
        let body: BodyStream = stream::unfold(
            (items, guard),
            move |(mut items, guard)| async move {
                let next = items.pop_front()?;
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Some((next, (items, guard)))
            },
        )
        .boxed();

        Ok(FetchResponse { ranged, body })
    }
}

/// Involutive XOR transform: applying it twice restores the input.
pub struct XorTransform(pub u8);

impl TransformStream for XorTransform {
    fn transform(&self, input: BodyStream) -> BodyStream {
        let key = self.0;
        input
            .map(move |item| {
                item.map(|buffer| {
                    Bytes::from(buffer.iter().map(|b| b ^ key).collect::<Vec<u8>>())
                })
            })
            .boxed()
    }
}

/// Transform that emits every buffer twice, doubling the content.
pub struct DoublingTransform;

impl TransformStream for DoublingTransform {
    fn transform(&self, input: BodyStream) -> BodyStream {
        input
            .flat_map(|item| match item {
                Ok(buffer) => stream::iter(vec![Ok(buffer.clone()), Ok(buffer)]),
                Err(err) => stream::iter(vec![Err(err)]),
            })
            .boxed()
    }
}
