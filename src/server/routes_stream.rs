//! Session routes: opening streams and serving their playlists and segments.

use super::error::AppError;
use super::routes_media::resolve_media_path;
use super::AppState;
use crate::session::{parse_segment_name, SessionStatus};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";

pub fn stream_routes() -> Router<AppState> {
    Router::new()
        .route("/open/*filename", get(open_stream))
        .route("/sessions", get(list_sessions))
        .route("/sessions/:name", delete(close_session))
        .route("/:session/:file", get(serve_stream_file))
}

#[derive(Debug, Deserialize)]
pub struct OpenParams {
    /// Session name; defaults to the file name.
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OpenResponse {
    pub name: String,
    pub master_playlist: String,
    pub renditions: Vec<String>,
}

async fn open_stream(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    Query(params): Query<OpenParams>,
) -> Result<(StatusCode, Json<OpenResponse>), AppError> {
    let path = resolve_media_path(&state.config.server.media_path, &filename)?;
    if !path.is_file() {
        return Err(AppError::not_found(format!("no such media file: {}", filename)));
    }

    let name = match params.name {
        Some(name) => name,
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| AppError::bad_request("media path has no file name"))?,
    };

    let session = state.registry.open_session(&name, &path).await?;
    let status = session.status().await;

    Ok((
        StatusCode::CREATED,
        Json(OpenResponse {
            name,
            master_playlist: status.master_playlist,
            renditions: status.renditions,
        }),
    ))
}

async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionStatus>> {
    Json(state.registry.list().await)
}

async fn close_session(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    state.registry.close_session(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn serve_stream_file(
    State(state): State<AppState>,
    Path((name, file)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let session = state
        .registry
        .get(&name)
        .ok_or_else(|| AppError::from(crate::session::Error::SessionNotFound(name.clone())))?;

    if file.ends_with(".m3u8") {
        session.touch();
        let path = session
            .playlist_path(&file)
            .ok_or_else(|| AppError::bad_request(format!("invalid playlist name: {}", file)))?;
        return stream_file(&path, PLAYLIST_CONTENT_TYPE).await;
    }

    if file.ends_with(".ts") {
        let segment = parse_segment_name(&file)
            .ok_or_else(|| AppError::bad_request(format!("invalid segment name: {}", file)))?;
        let response = state
            .registry
            .request_segment(&name, &segment.rendition, segment.number)
            .await?;
        tracing::debug!(session = %name, segment = %file, ?response, "Serving segment");
        return stream_file(response.path(), SEGMENT_CONTENT_TYPE).await;
    }

    Err(AppError::bad_request(format!("unsupported file type: {}", file)))
}

async fn stream_file(path: &std::path::Path, content_type: &'static str) -> Result<Response, AppError> {
    let file = tokio::fs::File::open(path).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response())
}
