//! Media library routes: listing and probing source files.

use super::error::AppError;
use super::AppState;
use crate::watch::is_media_file;
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use hlsvod_av::SourceMedia;
use serde::Serialize;
use std::path::{Component, PathBuf};
use walkdir::WalkDir;

pub fn media_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_media))
        .route("/probe/*filename", get(probe_media))
}

/// A playable file under the media path.
#[derive(Debug, Serialize)]
pub struct MediaEntry {
    /// Path relative to the media path, usable in `/open/...`.
    pub path: String,
    pub size: u64,
}

/// Resolve a request path against the media root, refusing anything that
/// would leave it.
pub fn resolve_media_path(root: &std::path::Path, relative: &str) -> Result<PathBuf, AppError> {
    let relative = std::path::Path::new(relative);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if relative.as_os_str().is_empty() || escapes {
        return Err(AppError::bad_request(format!(
            "invalid media path: {}",
            relative.display()
        )));
    }
    Ok(root.join(relative))
}

async fn list_media(State(state): State<AppState>) -> Result<Json<Vec<MediaEntry>>, AppError> {
    let root = state.config.server.media_path.clone();

    let entries = tokio::task::spawn_blocking(move || {
        let mut entries: Vec<MediaEntry> = WalkDir::new(&root)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file() && is_media_file(entry.path(), &[]))
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(&root).ok()?.to_string_lossy().into_owned();
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                Some(MediaEntry { path: relative, size })
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    })
    .await
    .map_err(|e| AppError::new(axum::http::StatusCode::INTERNAL_SERVER_ERROR, "internal_error", e.to_string()))?;

    Ok(Json(entries))
}

async fn probe_media(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<SourceMedia>, AppError> {
    let path = resolve_media_path(&state.config.server.media_path, &filename)?;
    if !path.is_file() {
        return Err(AppError::not_found(format!("no such media file: {}", filename)));
    }

    let ffprobe = state.config.tools.ffprobe_path.clone();
    let probe_path = path.clone();
    let media = tokio::task::spawn_blocking(move || {
        hlsvod_av::probe_with(&probe_path, ffprobe.as_deref())
    })
    .await
    .map_err(|e| AppError::new(axum::http::StatusCode::INTERNAL_SERVER_ERROR, "internal_error", e.to_string()))?
    .map_err(|e| AppError::from(crate::session::Error::probe(&path, e)))?;

    Ok(Json(media))
}
