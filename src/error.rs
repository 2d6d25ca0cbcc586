use std::io;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::headers::{AcceptRanges, HeaderMapExt};
use thiserror::Error;

/// Errors raised while opening a resource or building a ranged response.
///
/// Every variant maps to `416 Range Not Satisfiable` on the wire, the
/// variants exist so callers can tell bad input from I/O failure from a
/// client that went away.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("resource not found: {id}")]
    NotFound { id: String },

    #[error("failed to open resource {id}: {source}")]
    Open {
        id: String,
        #[source]
        source: io::Error,
    },

    #[error("range start {start} is past range end {end}")]
    InvertedRange { start: u64, end: u64 },

    #[error("range {start}-{end} is outside a resource of {length} bytes")]
    OutOfBounds { start: u64, end: u64, length: u64 },

    #[error("suffix of {suffix} bytes is longer than a resource of {length} bytes")]
    SuffixTooLong { suffix: u64, length: u64 },

    #[error("invalid value for header {name}: {value:?}")]
    InvalidHeader { name: &'static str, value: String },

    #[error("seek to offset {offset} failed: {source}")]
    Seek {
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("read at offset {position} failed: {source}")]
    Read {
        position: u64,
        #[source]
        source: io::Error,
    },

    #[error("resource ended at offset {position}, expected data through offset {end}")]
    UnexpectedEof { position: u64, end: u64 },

    #[error("writing to the response failed: {0}")]
    Write(#[source] io::Error),

    #[error("client disconnected")]
    ClientDisconnected,
}

/// Coarse classification of a [`TransferError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The resource does not exist.
    NotFound,
    /// The request or response metadata could not be used.
    BadInput,
    /// Storage or sink I/O failed.
    Io,
    /// The client stopped consuming the response.
    ClientGone,
}

impl TransferError {
    pub fn not_found<S: Into<String>>(id: S) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvertedRange { .. }
            | Self::OutOfBounds { .. }
            | Self::SuffixTooLong { .. }
            | Self::InvalidHeader { .. } => ErrorKind::BadInput,
            Self::Open { .. }
            | Self::Seek { .. }
            | Self::Read { .. }
            | Self::UnexpectedEof { .. }
            | Self::Write(_) => ErrorKind::Io,
            Self::ClientDisconnected => ErrorKind::ClientGone,
        }
    }

    /// Status code sent when this error ends a response before any body
    /// bytes were written.
    pub fn status(&self) -> StatusCode {
        StatusCode::RANGE_NOT_SATISFIABLE
    }
}

impl IntoResponse for TransferError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), ()).into_response();
        response.headers_mut().typed_insert(AcceptRanges::bytes());
        response
    }
}
