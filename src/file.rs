use std::io::{self, Cursor, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use pin_project::pin_project;
use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt, ReadBuf};

use crate::ResourceHandle;

/// Implements [`ResourceHandle`] for any [`AsyncRead`] and [`AsyncSeek`], constructed with a fixed byte size.
#[pin_project]
pub struct KnownSize<B> {
    byte_size: u64,
    #[pin]
    body: B,
}

impl<B> std::fmt::Debug for KnownSize<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnownSize")
            .field("byte_size", &self.byte_size)
            .finish()
    }
}

impl KnownSize<tokio::fs::File> {
    /// Calls [`tokio::fs::File::metadata`] to determine file size.
    pub async fn file(file: tokio::fs::File) -> io::Result<KnownSize<tokio::fs::File>> {
        let byte_size = file.metadata().await?.len();
        Ok(KnownSize { byte_size, body: file })
    }
}

impl KnownSize<Cursor<Bytes>> {
    /// An in-memory resource.
    pub fn bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let byte_size = bytes.len() as u64;
        KnownSize { byte_size, body: Cursor::new(bytes) }
    }

    /// The zero-length placeholder served in place of a missing resource.
    pub fn empty() -> Self {
        Self::bytes(Bytes::new())
    }
}

impl<B: AsyncRead + AsyncSeek> KnownSize<B> {
    /// Construct a [`KnownSize`] instance with a byte size supplied manually.
    pub fn sized(body: B, byte_size: u64) -> Self {
        KnownSize { byte_size, body }
    }

    pub fn into_inner(self) -> B {
        self.body
    }
}

impl<B: AsyncRead + AsyncSeek + Unpin> KnownSize<B> {
    /// Uses `seek` to determine size by seeking to the end and getting stream position.
    pub async fn seek(mut body: B) -> io::Result<KnownSize<B>> {
        let byte_size = body.seek(SeekFrom::End(0)).await?;
        body.seek(SeekFrom::Start(0)).await?;
        Ok(KnownSize { byte_size, body })
    }
}

impl<B: AsyncRead> AsyncRead for KnownSize<B> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        this.body.poll_read(cx, buf)
    }
}

impl<B: AsyncSeek> AsyncSeek for KnownSize<B> {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        let this = self.project();
        this.body.start_seek(position)
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        let this = self.project();
        this.body.poll_complete(cx)
    }
}

impl<B: AsyncRead + AsyncSeek + Unpin + Send> ResourceHandle for KnownSize<B> {
    fn byte_size(&self) -> u64 {
        self.byte_size
    }
}
