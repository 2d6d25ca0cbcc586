//! Demo media server.
//!
//! ```text
//! MEDIA_ROOT=/srv/media MEDIA_DEFAULT=match.mp4 cargo run --example serve
//! curl -H 'Accept: video/*' -H 'Range: bytes=0-99' localhost:3000/api/streamservice
//! curl -X POST 'localhost:3000/api/pace?paused=true'
//! ```

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header::ACCEPT;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use axum_chunked_range::{FileProvider, PartialContentWriter, RangeHeader, StreamConfig, StreamService};

struct AppState {
    service: StreamService<FileProvider>,
    default_video: String,
    pace: watch::Sender<bool>,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let root = std::env::var("MEDIA_ROOT").unwrap_or_else(|_| ".".to_string());
    let default_video = std::env::var("MEDIA_DEFAULT").unwrap_or_else(|_| "video.mp4".to_string());
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

    let (pace, paused) = watch::channel(false);
    let writer = PartialContentWriter::new(StreamConfig::default()).with_pace(Arc::new(paused));
    let state = Arc::new(AppState {
        service: StreamService::new(FileProvider::new(root)).with_writer(writer),
        default_video,
        pace,
    });

    let router = Router::new()
        .route("/", get(|| async { "Hello, World!" }))
        .route("/api/streamservice", get(get_video))
        .route("/api/pace", post(set_pace))
        .route("/media/{id}", get(get_media))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, router).await
}

/// Only browsers asking for video (or anything) get the default video.
fn wants_video(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT)
        .and_then(|accept| accept.to_str().ok())
        .is_some_and(|accept| accept.contains("video") || accept.contains("*/*"))
}

async fn get_video(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    RangeHeader(range): RangeHeader,
) -> Response {
    if !wants_video(&headers) {
        return state.service.placeholder();
    }
    state.service.respond(&state.default_video, range.as_ref()).await
}

async fn get_media(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    RangeHeader(range): RangeHeader,
) -> Response {
    state.service.respond(&id, range.as_ref()).await
}

#[derive(Debug, Deserialize)]
struct PaceRequest {
    paused: bool,
}

async fn set_pace(State(state): State<Arc<AppState>>, Query(q): Query<PaceRequest>) -> impl IntoResponse {
    state.pace.send_replace(q.paused);
    info!(paused = q.paused, "pacing updated");
    StatusCode::NO_CONTENT
}
