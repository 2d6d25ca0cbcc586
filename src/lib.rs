//! # axum-chunked-range
//!
//! Paced HTTP range responses for large media in [`axum`][1].
//!
//! A request's `Range` header is parsed into a [`RangeDecision`], which then
//! selects one of four responses:
//!
//! * `204 No Content` for a zero-length resource,
//! * `200 OK` with the whole resource when there is no usable range,
//! * `206 Partial Content` with `Content-Range` for a single valid range,
//! * `416 Range Not Satisfiable` with an empty body when building the
//!   response fails.
//!
//! Bodies are copied from any [`ResourceHandle`] one buffer at a time. A
//! [`PaceSource`] can pause delivery mid-transfer; while paused the
//! connection is kept alive with empty writes and the read cursor does not
//! move.
//!
//! Any type implementing both [`AsyncRead`] and [`AsyncSeek`] can be used
//! through the [`KnownSize`] adapter, with special cased support for
//! [`tokio::fs::File`] in [`KnownSize::file`].
//!
//! ```no_run
//! use axum::Router;
//! use axum::routing::get;
//!
//! use axum_chunked_range::{KnownSize, RangeHeader, Ranged};
//!
//! async fn video(RangeHeader(range): RangeHeader) -> Ranged<KnownSize<tokio::fs::File>> {
//!     let file = tokio::fs::File::open("video.mp4").await.unwrap();
//!     let body = KnownSize::file(file).await.unwrap();
//!     Ranged::new(range.as_ref(), body, "video/mp4")
//! }
//!
//! let _app = Router::<()>::new().route("/video", get(video));
//! ```
//!
//! [1]: https://docs.rs/axum

mod config;
mod error;
mod file;
mod pace;
mod parse;
mod provider;
mod response;
mod service;
mod stream;
mod writer;

use tokio::io::{AsyncRead, AsyncSeek};

pub use config::{StreamConfig, DEFAULT_BUFFER_CAPACITY, MIN_PAUSE_POLL_INTERVAL};
pub use error::{ErrorKind, TransferError};
pub use file::KnownSize;
pub use pace::{NeverPaused, PaceGate, PaceSource};
pub use parse::{parse_range_items, RangeDecision, RangeItem};
pub use provider::{FileProvider, OpenedResource, ResourceProvider};
pub use response::{RangeHeader, Ranged, RangedResponse};
pub use service::StreamService;
pub use stream::{chunked_transfer, ChunkedStream};
pub use writer::{BufferedSink, PartialContentWriter, ResponseSink};

/// An open, seekable byte source with a fixed known length.
///
/// Owned by exactly one request, dropping it releases the underlying
/// file or object.
pub trait ResourceHandle: AsyncRead + AsyncSeek + Unpin + Send {
    /// The total size of the resource in bytes.
    ///
    /// This should not change for the lifetime of the handle once queried.
    fn byte_size(&self) -> u64;
}

impl<R: ResourceHandle + ?Sized> ResourceHandle for Box<R> {
    fn byte_size(&self) -> u64 {
        (**self).byte_size()
    }
}

/// An inclusive `[start, end]` byte window of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Create a byte range with inclusive start and inclusive end.
    pub fn new(start: u64, end: u64) -> Self {
        ByteRange { start, end }
    }

    /// Number of bytes in the window, `None` when `start > end` or when the
    /// count does not fit in a `u64`.
    pub fn len(&self) -> Option<u64> {
        self.end.checked_sub(self.start)?.checked_add(1)
    }

    /// Whole resource of `byte_size` bytes, `None` when it is empty.
    pub fn full(byte_size: u64) -> Option<Self> {
        byte_size.checked_sub(1).map(|end| ByteRange::new(0, end))
    }
}
