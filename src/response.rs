use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::{CONTENT_TYPE, RANGE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_extra::headers::{AcceptRanges, ContentLength, ContentRange, HeaderMapExt};
use tracing::{info, warn};

use crate::{
    ByteRange, ChunkedStream, PaceGate, PaceSource, RangeDecision, ResourceHandle, StreamConfig,
    TransferError,
};

/// The raw `Range` request header, if any. Never rejects.
#[derive(Debug, Clone, Default)]
pub struct RangeHeader(pub Option<HeaderValue>);

impl<S: Send + Sync> FromRequestParts<S> for RangeHeader {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RangeHeader(parts.headers.get(RANGE).cloned()))
    }
}

/// The main responder type. Implements [`IntoResponse`].
pub struct Ranged<R: ResourceHandle + 'static> {
    decision: RangeDecision,
    body: R,
    content_type: String,
    config: StreamConfig,
    pace: Option<Arc<dyn PaceSource>>,
}

impl<R: ResourceHandle + 'static> std::fmt::Debug for Ranged<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ranged")
            .field("decision", &self.decision)
            .field("byte_size", &self.body.byte_size())
            .field("content_type", &self.content_type)
            .field("paced", &self.pace.is_some())
            .finish()
    }
}

impl<R: ResourceHandle + 'static> Ranged<R> {
    /// Construct a ranged response over any [`ResourceHandle`] and an
    /// optional raw `Range` header.
    pub fn new(range: Option<&HeaderValue>, body: R, content_type: impl Into<String>) -> Self {
        let decision = RangeDecision::from_header(range, body.byte_size());
        Self::with_decision(decision, body, content_type)
    }

    /// Construct a ranged response from an already parsed header.
    pub fn with_decision(decision: RangeDecision, body: R, content_type: impl Into<String>) -> Self {
        Ranged {
            decision,
            body,
            content_type: content_type.into(),
            config: StreamConfig::default(),
            pace: None,
        }
    }

    pub fn with_config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    /// Let `pace` hold back delivery of a partial body.
    pub fn with_pace(mut self, pace: Arc<dyn PaceSource>) -> Self {
        self.pace = Some(pace);
        self
    }

    pub fn decision(&self) -> RangeDecision {
        self.decision
    }

    /// Picks status and headers and prepares the body, without reading
    /// anything yet. Errors here become a `416` with an empty body.
    pub fn try_respond(self) -> Result<RangedResponse, TransferError> {
        let total_bytes = self.body.byte_size();
        let content_type = if self.content_type.is_empty() {
            &self.config.default_content_type
        } else {
            &self.content_type
        };
        let content_type = HeaderValue::from_str(content_type).map_err(|_| {
            TransferError::InvalidHeader { name: "content-type", value: content_type.clone() }
        })?;

        let Some(whole) = ByteRange::full(total_bytes) else {
            info!("zero-length resource, responding 204");
            return Ok(RangedResponse::Empty { content_type });
        };

        match self.decision {
            RangeDecision::NoRange | RangeDecision::Unsatisfiable => {
                if self.decision == RangeDecision::Unsatisfiable {
                    info!(total_bytes, "range not satisfiable, falling back to full content");
                } else {
                    info!(total_bytes, "no usable range, returning full content");
                }
                let stream = ChunkedStream::new(self.body, whole, &self.config, PaceGate::unpaced());
                Ok(RangedResponse::Full {
                    content_length: ContentLength(total_bytes),
                    content_type,
                    stream,
                })
            }
            RangeDecision::SuffixTooLong { suffix } => {
                Err(TransferError::SuffixTooLong { suffix, length: total_bytes })
            }
            RangeDecision::Range(range) => {
                let ByteRange { start, end } = range;
                if start > end {
                    return Err(TransferError::InvertedRange { start, end });
                }
                if end >= total_bytes {
                    return Err(TransferError::OutOfBounds { start, end, length: total_bytes });
                }
                let length = range.len().ok_or(TransferError::InvertedRange { start, end })?;
                let content_range = ContentRange::bytes(start..=end, total_bytes)
                    .map_err(|_| TransferError::InvertedRange { start, end })?;

                info!(start, end, total_bytes, "returning partial content");
                let gate = match self.pace {
                    Some(pace) => PaceGate::new(pace, self.config.pause_poll_interval),
                    None => PaceGate::unpaced(),
                };
                let stream = ChunkedStream::new(self.body, range, &self.config, gate);
                Ok(RangedResponse::Partial {
                    range,
                    content_range,
                    content_length: ContentLength(length),
                    content_type,
                    stream,
                })
            }
        }
    }
}

impl<R: ResourceHandle + 'static> IntoResponse for Ranged<R> {
    fn into_response(self) -> Response {
        match self.try_respond() {
            Ok(response) => response.into_response(),
            Err(e) => {
                warn!(error = %e, "could not build ranged response");
                e.into_response()
            }
        }
    }
}

/// Computed headers and body for a ranged response. Implements [`IntoResponse`].
#[derive(Debug)]
pub enum RangedResponse {
    /// Zero-length resource.
    Empty {
        content_type: HeaderValue,
    },
    /// Whole resource, no usable range requested.
    Full {
        content_length: ContentLength,
        content_type: HeaderValue,
        stream: ChunkedStream,
    },
    /// A single satisfiable range.
    Partial {
        range: ByteRange,
        content_range: ContentRange,
        content_length: ContentLength,
        content_type: HeaderValue,
        stream: ChunkedStream,
    },
}

impl RangedResponse {
    pub fn status(&self) -> StatusCode {
        match self {
            RangedResponse::Empty { .. } => StatusCode::NO_CONTENT,
            RangedResponse::Full { .. } => StatusCode::OK,
            RangedResponse::Partial { .. } => StatusCode::PARTIAL_CONTENT,
        }
    }

    /// Response headers, `Accept-Ranges` first.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.typed_insert(AcceptRanges::bytes());

        use RangedResponse::*;
        match self {
            Empty { content_type } => {
                headers.insert(CONTENT_TYPE, content_type.clone());
            }
            Full { content_length, content_type, .. } => {
                headers.typed_insert(ContentLength(content_length.0));
                headers.insert(CONTENT_TYPE, content_type.clone());
            }
            Partial { content_range, content_length, content_type, .. } => {
                headers.typed_insert(ContentLength(content_length.0));
                headers.insert(CONTENT_TYPE, content_type.clone());
                headers.typed_insert(content_range.clone());
            }
        }
        headers
    }

    pub fn into_parts(self) -> (StatusCode, HeaderMap, ChunkedStream) {
        let status = self.status();
        let headers = self.headers();
        let stream = match self {
            RangedResponse::Empty { .. } => ChunkedStream::empty(),
            RangedResponse::Full { stream, .. } | RangedResponse::Partial { stream, .. } => stream,
        };
        (status, headers, stream)
    }
}

impl IntoResponse for RangedResponse {
    fn into_response(self) -> Response {
        self.into_parts().into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use assert_matches::assert_matches;
    use axum::body::to_bytes;
    use tokio::fs::File;

    use super::*;
    use crate::KnownSize;

    fn range(header: &'static str) -> Option<HeaderValue> {
        Some(HeaderValue::from_static(header))
    }

    async fn body() -> KnownSize<File> {
        let file = File::open("test/fixture.txt").await.unwrap();
        KnownSize::file(file).await.unwrap()
    }

    async fn respond(ranged: Ranged<KnownSize<File>>) -> (StatusCode, HeaderMap, String) {
        let response = ranged.into_response();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_full_response() {
        let (status, head, body) = respond(Ranged::new(None, body().await, "text/plain")).await;
        assert_eq!(StatusCode::OK, status);
        assert_eq!("bytes", head["accept-ranges"]);
        assert_eq!("54", head["content-length"]);
        assert_eq!("text/plain", head["content-type"]);
        assert!(head.get("content-range").is_none());
        assert_eq!("Hello world this is a file to test range requests on!\n", body);
    }

    #[tokio::test]
    async fn test_partial_response() {
        let (status, head, body) = respond(Ranged::new(range("bytes=0-29").as_ref(), body().await, "text/plain")).await;
        assert_eq!(StatusCode::PARTIAL_CONTENT, status);
        assert_eq!("bytes", head["accept-ranges"]);
        assert_eq!("30", head["content-length"]);
        assert_eq!("bytes 0-29/54", head["content-range"]);
        assert_eq!("Hello world this is a file to ", body);
    }

    #[tokio::test]
    async fn test_suffix_response() {
        let (status, head, body) = respond(Ranged::new(range("bytes=-20").as_ref(), body().await, "text/plain")).await;
        assert_eq!(StatusCode::PARTIAL_CONTENT, status);
        assert_eq!("bytes 34-53/54", head["content-range"]);
        assert_eq!(" range requests on!\n", body);
    }

    #[tokio::test]
    async fn test_unbounded_end_response() {
        let (status, head, body) = respond(Ranged::new(range("bytes=40-").as_ref(), body().await, "text/plain")).await;
        assert_eq!(StatusCode::PARTIAL_CONTENT, status);
        assert_eq!("bytes 40-53/54", head["content-range"]);
        assert_eq!("14", head["content-length"]);
        assert_eq!(" requests on!\n", body);
    }

    #[tokio::test]
    async fn test_one_byte_response() {
        let (status, head, body) = respond(Ranged::new(range("bytes=30-30").as_ref(), body().await, "text/plain")).await;
        assert_eq!(StatusCode::PARTIAL_CONTENT, status);
        assert_eq!("bytes 30-30/54", head["content-range"]);
        assert_eq!("t", body);
    }

    #[tokio::test]
    async fn test_unsatisfiable_falls_back_to_full() {
        for header in ["bytes=99-", "bytes=30-99"] {
            let (status, head, body) = respond(Ranged::new(range(header).as_ref(), body().await, "text/plain")).await;
            assert_eq!(StatusCode::OK, status, "{header}");
            assert_eq!("54", head["content-length"]);
            assert!(head.get("content-range").is_none());
            assert_eq!(54, body.len());
        }
    }

    #[tokio::test]
    async fn test_multiple_ranges_fall_back_to_full() {
        let (status, _, body) = respond(Ranged::new(range("bytes=0-0,-1").as_ref(), body().await, "text/plain")).await;
        assert_eq!(StatusCode::OK, status);
        assert_eq!(54, body.len());
    }

    #[tokio::test]
    async fn test_zero_length_is_no_content() {
        let ranged = Ranged::new(range("bytes=0-10").as_ref(), KnownSize::empty(), "text/plain");
        let response = ranged.into_response();
        assert_eq!(StatusCode::NO_CONTENT, response.status());
        assert_eq!("bytes", response.headers()["accept-ranges"]);
        assert_eq!("text/plain", response.headers()["content-type"]);
        assert!(to_bytes(response.into_body(), usize::MAX).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inverted_window_is_416() {
        let decision = RangeDecision::Range(ByteRange::new(30, 29));
        let ranged = Ranged::with_decision(decision, body().await, "text/plain");
        assert_matches!(ranged.try_respond(), Err(TransferError::InvertedRange { start: 30, end: 29 }));

        let ranged = Ranged::with_decision(decision, body().await, "text/plain");
        let (status, head, body) = respond(ranged).await;
        assert_eq!(StatusCode::RANGE_NOT_SATISFIABLE, status);
        assert_eq!("bytes", head["accept-ranges"]);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_window_past_length_is_416() {
        let decision = RangeDecision::Range(ByteRange::new(10, 60));
        let ranged = Ranged::with_decision(decision, body().await, "text/plain");
        assert_matches!(ranged.try_respond(), Err(TransferError::OutOfBounds { length: 54, .. }));
    }

    #[tokio::test]
    async fn test_window_to_u64_max_is_416() {
        let decision = RangeDecision::Range(ByteRange::new(0, u64::MAX));
        let ranged = Ranged::with_decision(decision, body().await, "text/plain");
        assert_matches!(ranged.try_respond(), Err(TransferError::OutOfBounds { start: 0, end: u64::MAX, length: 54 }));

        let ranged = Ranged::with_decision(decision, body().await, "text/plain");
        let (status, head, body) = respond(ranged).await;
        assert_eq!(StatusCode::RANGE_NOT_SATISFIABLE, status);
        assert!(head.get("content-range").is_none());
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_suffix_longer_than_resource_is_416() {
        let ranged = Ranged::new(range("bytes=-2000").as_ref(), body().await, "text/plain");
        assert_eq!(RangeDecision::SuffixTooLong { suffix: 2000 }, ranged.decision());
        assert_matches!(ranged.try_respond(), Err(TransferError::SuffixTooLong { suffix: 2000, length: 54 }));

        let (status, head, body) = respond(Ranged::new(range("bytes=-55").as_ref(), body().await, "text/plain")).await;
        assert_eq!(StatusCode::RANGE_NOT_SATISFIABLE, status);
        assert_eq!("bytes", head["accept-ranges"]);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_bad_content_type_is_416() {
        let (status, _, body) = respond(Ranged::new(None, body().await, "video/\nmp4")).await;
        assert_eq!(StatusCode::RANGE_NOT_SATISFIABLE, status);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_default_content_type() {
        let (_, head, _) = respond(Ranged::new(None, body().await, "")).await;
        assert_eq!("application/octet-stream", head["content-type"]);
    }

    #[tokio::test]
    async fn test_headers_and_status_of_parts() {
        let ranged = Ranged::new(range("bytes=6-10").as_ref(), body().await, "text/plain");
        let response = ranged.try_respond().unwrap();
        assert_matches!(&response, RangedResponse::Partial { range: ByteRange { start: 6, end: 10 }, .. });

        let (status, headers, stream) = response.into_parts();
        assert_eq!(StatusCode::PARTIAL_CONTENT, status);
        assert_eq!("bytes", headers["accept-ranges"]);
        assert_eq!(5, stream.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_paced_partial_response_completes() {
        let paused = Arc::new(AtomicBool::new(true));
        let ranged = Ranged::new(range("bytes=6-10").as_ref(), body().await, "text/plain")
            .with_pace(paused.clone());

        let resume = tokio::spawn({
            let paused = paused.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                paused.store(false, Ordering::Release);
            }
        });

        let (status, _, body) = respond(ranged).await;
        resume.await.unwrap();
        assert_eq!(StatusCode::PARTIAL_CONTENT, status);
        assert_eq!("world", body);
    }

    #[tokio::test]
    async fn test_range_header_extractor() {
        let request = axum::http::Request::builder()
            .header("range", "bytes=1-2")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();
        let RangeHeader(value) = RangeHeader::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(Some(HeaderValue::from_static("bytes=1-2")), value);
    }
}
