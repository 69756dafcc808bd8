//! Caller-supplied byte-stream transforms.

use crate::transport::BodyStream;

/// A lazy byte-stream endomorphism interposed between network and disk.
///
/// The transform receives the response body as a stream and returns the
/// stream that will actually be written to the destination file. It may
/// change the content length (an encrypting transform typically does) and
/// is responsible for its own framing. Per-chunk progress accounting uses
/// the post-transform byte count.
pub trait TransformStream: Send + Sync {
    /// Wrap `input` and return the stream to persist.
    fn transform(&self, input: BodyStream) -> BodyStream;
}
