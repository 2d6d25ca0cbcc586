use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use axum_extra::headers::{AcceptRanges, HeaderMapExt};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tracing::warn;

use crate::{PaceSource, RangeDecision, Ranged, ResourceHandle, StreamConfig, TransferError};

/// Where a response goes: a status line, headers, then body chunks in order.
#[async_trait]
pub trait ResponseSink: Send {
    fn set_status(&mut self, status: StatusCode);

    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Write one chunk, returning once the sink has taken it. An empty chunk
    /// is a keep-alive. Returns [`TransferError::ClientDisconnected`] once the
    /// client has gone.
    async fn write(&mut self, chunk: Bytes) -> Result<(), TransferError>;

    /// Give up on the response with `status`. Headers of the abandoned
    /// response are dropped, only `Accept-Ranges` is kept.
    fn abort(&mut self, status: StatusCode) {
        reset_head(self.headers_mut());
        self.set_status(status);
    }
}

fn reset_head(headers: &mut HeaderMap) {
    headers.clear();
    headers.typed_insert(AcceptRanges::bytes());
}

/// A sink that keeps the whole response in memory.
#[derive(Debug)]
pub struct BufferedSink {
    status: StatusCode,
    headers: HeaderMap,
    chunks: Vec<Bytes>,
}

impl Default for BufferedSink {
    fn default() -> Self {
        BufferedSink { status: StatusCode::OK, headers: HeaderMap::new(), chunks: Vec::new() }
    }
}

impl BufferedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Every write in order, keep-alives included.
    pub fn chunks(&self) -> &[Bytes] {
        &self.chunks
    }

    pub fn body(&self) -> Bytes {
        let mut body = BytesMut::new();
        for chunk in &self.chunks {
            body.extend_from_slice(chunk);
        }
        body.freeze()
    }
}

#[async_trait]
impl ResponseSink for BufferedSink {
    fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    async fn write(&mut self, chunk: Bytes) -> Result<(), TransferError> {
        self.chunks.push(chunk);
        Ok(())
    }

    /// Nothing was sent yet, so the buffered body is dropped.
    fn abort(&mut self, status: StatusCode) {
        reset_head(&mut self.headers);
        self.status = status;
        self.chunks.clear();
    }
}

/// Drives a ranged transfer into a [`ResponseSink`].
#[derive(Clone, Default)]
pub struct PartialContentWriter {
    config: StreamConfig,
    pace: Option<Arc<dyn PaceSource>>,
}

impl std::fmt::Debug for PartialContentWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartialContentWriter")
            .field("config", &self.config)
            .field("paced", &self.pace.is_some())
            .finish()
    }
}

impl PartialContentWriter {
    pub fn new(config: StreamConfig) -> Self {
        PartialContentWriter { config, pace: None }
    }

    pub fn with_pace(mut self, pace: Arc<dyn PaceSource>) -> Self {
        self.pace = Some(pace);
        self
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Wrap `resource` in a [`Ranged`] responder carrying this writer's
    /// configuration and pacing.
    pub fn ranged<R>(&self, resource: R, decision: RangeDecision, content_type: &str) -> Ranged<R>
    where
        R: ResourceHandle + 'static,
    {
        let ranged = Ranged::with_decision(decision, resource, content_type)
            .with_config(self.config.clone());
        match &self.pace {
            Some(pace) => ranged.with_pace(pace.clone()),
            None => ranged,
        }
    }

    /// Send `decision` of `resource` to `sink`.
    ///
    /// `Accept-Ranges` is set before anything else. On failure the sink is
    /// aborted with `416` and the tagged error is returned. `resource` is
    /// dropped before this returns on every path.
    pub async fn write<R, S>(
        &self,
        resource: R,
        decision: RangeDecision,
        content_type: &str,
        sink: &mut S,
    ) -> Result<(), TransferError>
    where
        R: ResourceHandle + 'static,
        S: ResponseSink + ?Sized,
    {
        sink.headers_mut().typed_insert(AcceptRanges::bytes());

        match self.send(resource, decision, content_type, sink).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, kind = ?e.kind(), "transfer failed");
                sink.abort(e.status());
                Err(e)
            }
        }
    }

    async fn send<R, S>(
        &self,
        resource: R,
        decision: RangeDecision,
        content_type: &str,
        sink: &mut S,
    ) -> Result<(), TransferError>
    where
        R: ResourceHandle + 'static,
        S: ResponseSink + ?Sized,
    {
        let response = self.ranged(resource, decision, content_type).try_respond()?;
        let (status, headers, mut stream) = response.into_parts();

        sink.set_status(status);
        sink.headers_mut().extend(headers);

        while let Some(chunk) = stream.next().await {
            sink.write(chunk?).await?;
        }
        Ok(())
    }
}
