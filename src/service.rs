use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};

use crate::{
    KnownSize, PartialContentWriter, RangeDecision, ResourceHandle, ResourceProvider,
    ResponseSink, TransferError,
};

/// Content type of the placeholder served for a missing resource.
const PLACEHOLDER_CONTENT_TYPE: &str = "text/plain";

/// Looks resources up through a [`ResourceProvider`] and streams them.
///
/// A missing resource is not an error for the client: it gets the empty
/// placeholder instead, which answers `204 No Content`.
#[derive(Debug, Clone)]
pub struct StreamService<P> {
    provider: P,
    writer: PartialContentWriter,
}

impl<P: ResourceProvider> StreamService<P> {
    pub fn new(provider: P) -> Self {
        StreamService { provider, writer: PartialContentWriter::default() }
    }

    pub fn with_writer(mut self, writer: PartialContentWriter) -> Self {
        self.writer = writer;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Respond with resource `id` for a request carrying `range`.
    pub async fn respond(&self, id: &str, range: Option<&HeaderValue>) -> Response {
        match self.provider.open(id).await {
            Ok(opened) => {
                let decision = RangeDecision::from_header(range, opened.handle.byte_size());
                self.writer
                    .ranged(opened.handle, decision, &opened.content_type)
                    .into_response()
            }
            Err(TransferError::NotFound { id }) => {
                info!(%id, "resource not found, serving placeholder");
                self.placeholder()
            }
            Err(e) => {
                warn!(error = %e, "could not open resource");
                e.into_response()
            }
        }
    }

    /// The empty placeholder response.
    pub fn placeholder(&self) -> Response {
        self.writer
            .ranged(KnownSize::empty(), RangeDecision::NoRange, PLACEHOLDER_CONTENT_TYPE)
            .into_response()
    }

    /// Like [`StreamService::respond`], writing into `sink` instead.
    pub async fn write_to<S>(&self, id: &str, range: Option<&str>, sink: &mut S) -> Result<(), TransferError>
    where
        S: ResponseSink + ?Sized,
    {
        match self.provider.open(id).await {
            Ok(opened) => {
                let decision = RangeDecision::parse(range, opened.handle.byte_size());
                self.writer.write(opened.handle, decision, &opened.content_type, sink).await
            }
            Err(TransferError::NotFound { id }) => {
                info!(%id, "resource not found, serving placeholder");
                self.writer
                    .write(KnownSize::empty(), RangeDecision::NoRange, PLACEHOLDER_CONTENT_TYPE, sink)
                    .await
            }
            Err(e) => {
                warn!(error = %e, "could not open resource");
                sink.abort(e.status());
                Err(e)
            }
        }
    }
}
