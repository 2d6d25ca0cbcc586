use std::io::SeekFrom;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_stream::stream;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use http_body::{Body, Frame, SizeHint};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use crate::{ByteRange, PaceGate, ResourceHandle, StreamConfig, TransferError};

/// Copies `range` out of `resource` one buffer at a time.
///
/// Each item is at most `config.buffer_capacity` bytes and the next read
/// only starts once the previous item has been taken, so a slow consumer
/// holds at most one buffer per transfer. While `gate` reports paused, the
/// stream sleeps `config.pause_sleep` and yields empty chunks without moving
/// the cursor. The stream ends after `range.end`, or after the first error.
pub fn chunked_transfer<R>(
    resource: R,
    range: ByteRange,
    config: &StreamConfig,
    gate: PaceGate,
) -> impl Stream<Item = Result<Bytes, TransferError>> + Send + 'static
where
    R: ResourceHandle + 'static,
{
    let mut transfer = Transfer {
        resource,
        range,
        position: range.start,
        seeked: false,
        buffer: vec![0; config.buffer_capacity.max(1)],
        gate,
        pause_sleep: config.pause_sleep,
    };

    stream! {
        while let Some(chunk) = transfer.next_chunk().await {
            let failed = chunk.is_err();
            yield chunk;
            if failed {
                break;
            }
        }
    }
}

struct Transfer<R> {
    resource: R,
    range: ByteRange,
    position: u64,
    seeked: bool,
    buffer: Vec<u8>,
    gate: PaceGate,
    pause_sleep: Duration,
}

impl<R: ResourceHandle> Transfer<R> {
    async fn next_chunk(&mut self) -> Option<Result<Bytes, TransferError>> {
        if self.position > self.range.end {
            return None;
        }
        if !self.seeked {
            if let Err(e) = self.seek().await {
                return Some(Err(e));
            }
        }
        Some(self.step().await)
    }

    async fn seek(&mut self) -> Result<(), TransferError> {
        let offset = self.range.start;
        self.resource
            .seek(SeekFrom::Start(offset))
            .await
            .map_err(|source| TransferError::Seek { offset, source })?;
        self.seeked = true;
        Ok(())
    }

    async fn step(&mut self) -> Result<Bytes, TransferError> {
        if self.gate.is_paused().await {
            tokio::time::sleep(self.pause_sleep).await;
            return Ok(Bytes::new());
        }

        let ByteRange { start, end } = self.range;
        let position = self.position;
        let remaining = end - position + 1;
        let to_read = usize::try_from(remaining)
            .map_or(self.buffer.len(), |remaining| remaining.min(self.buffer.len()));
        debug!(position, end, start, remaining, "reading chunk");

        let count = self
            .resource
            .read(&mut self.buffer[..to_read])
            .await
            .map_err(|source| TransferError::Read { position, source })?;
        if count == 0 {
            return Err(TransferError::UnexpectedEof { position, end });
        }

        self.position += count as u64;
        Ok(Bytes::copy_from_slice(&self.buffer[..count]))
    }
}

/// Response body of exactly `length` bytes. Implements [`Stream`], [`Body`], and [`IntoResponse`].
pub struct ChunkedStream {
    length: u64,
    inner: BoxStream<'static, Result<Bytes, TransferError>>,
}

impl std::fmt::Debug for ChunkedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedStream")
            .field("length", &self.length)
            .finish()
    }
}

impl ChunkedStream {
    /// Stream `range` of `resource`. An inverted range yields an empty body.
    pub fn new<R>(resource: R, range: ByteRange, config: &StreamConfig, gate: PaceGate) -> Self
    where
        R: ResourceHandle + 'static,
    {
        let length = range.len().unwrap_or(0);
        let inner = chunked_transfer(resource, range, config, gate).boxed();
        ChunkedStream { length, inner }
    }

    pub fn empty() -> Self {
        ChunkedStream { length: 0, inner: futures::stream::empty().boxed() }
    }

    /// Number of bytes this body will produce.
    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

impl IntoResponse for ChunkedStream {
    fn into_response(self) -> Response {
        Response::new(axum::body::Body::new(self))
    }
}

impl Body for ChunkedStream {
    type Data = Bytes;
    type Error = TransferError;

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.length)
    }

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>)
        -> Poll<Option<Result<Frame<Bytes>, TransferError>>>
    {
        self.poll_next(cx).map(|item| item.map(|result| result.map(Frame::data)))
    }
}

impl Stream for ChunkedStream {
    type Item = Result<Bytes, TransferError>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>
    ) -> Poll<Option<Result<Bytes, TransferError>>> {
        self.inner.poll_next_unpin(cx)
    }
}
