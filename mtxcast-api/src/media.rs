//! Metadata and file playback endpoints

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use mtxcast_core::{MetadataPayload, PlayerStatus};

use crate::{
    error::{AppError, AppResult},
    AppState,
};

/// Optional original file name supplied with an upload; only its extension
/// is trusted.
pub const FILE_NAME_HEADER: &str = "x-file-name";
/// Start offset in seconds, header alternative to the query parameter.
pub const START_TIME_HEADER: &str = "x-start-time";

#[derive(Debug, Serialize, Deserialize)]
pub struct MetadataResponse {
    pub stream_type: String,
    pub title: Option<String>,
    pub is_playing: bool,
}

impl From<&PlayerStatus> for MetadataResponse {
    fn from(status: &PlayerStatus) -> Self {
        Self {
            stream_type: status.stream_type.as_str().to_string(),
            title: status.title.clone(),
            is_playing: status.is_playing,
        }
    }
}

/// `POST /metadata` — resolve a source URL and start playback.
pub async fn post_metadata(
    State(state): State<AppState>,
    Json(payload): Json<MetadataPayload>,
) -> AppResult<Json<MetadataResponse>> {
    info!(source_url = %payload.source_url, "Metadata playback requested");
    let status = state.manager.handle_metadata(&payload).await?;
    Ok(Json(MetadataResponse::from(&status)))
}

#[derive(Debug, Default, Deserialize)]
pub struct FileQuery {
    #[serde(default)]
    pub start_time: Option<f64>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileResponse {
    pub stream_type: String,
    pub title: Option<String>,
    pub is_playing: bool,
    pub file_path: String,
}

/// `POST /file` — persist the raw request body under the upload directory
/// and play it. The stored file is removed again if playback fails.
pub async fn post_file(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<FileResponse>> {
    if body.is_empty() {
        return Err(AppError::bad_request("Empty file upload"));
    }

    let file_name = headers
        .get(FILE_NAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let start_time = query.start_time.or_else(|| {
        headers
            .get(START_TIME_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    });

    tokio::fs::create_dir_all(&state.upload_dir)
        .await
        .map_err(|e| AppError::internal(format!("Cannot create upload dir: {e}")))?;

    let stored = stored_path(&state.upload_dir, file_name.as_deref());
    tokio::fs::write(&stored, &body)
        .await
        .map_err(|e| AppError::internal(format!("Cannot store upload: {e}")))?;
    info!(path = %stored.display(), bytes = body.len(), "Stored uploaded file");

    // Guard deletes the stored file unless playback succeeds.
    let mut guard = UploadGuard::new(stored.clone());
    let status = state
        .manager
        .handle_file(&stored, start_time.unwrap_or(0.0), query.title)
        .await?;
    guard.disarm();

    Ok(Json(FileResponse {
        stream_type: status.stream_type.as_str().to_string(),
        title: status.title.clone(),
        is_playing: status.is_playing,
        file_path: stored.display().to_string(),
    }))
}

/// Unique storage path for an upload, keeping only the extension from the
/// client-supplied name.
fn stored_path(upload_dir: &Path, file_name: Option<&str>) -> PathBuf {
    let extension = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.chars().all(char::is_alphanumeric))
        .unwrap_or("bin");
    upload_dir.join(format!("upload-{}.{extension}", uuid::Uuid::new_v4()))
}

/// Removes the stored upload on drop unless disarmed.
struct UploadGuard {
    path: PathBuf,
    armed: bool,
}

impl UploadGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "Failed to remove rejected upload");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_path_keeps_safe_extension() {
        let dir = PathBuf::from("/uploads");
        let path = stored_path(&dir, Some("movie.mkv"));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("mkv"));
        assert!(path.starts_with("/uploads"));
    }

    #[test]
    fn test_stored_path_rejects_hostile_names() {
        let dir = PathBuf::from("/uploads");
        let path = stored_path(&dir, Some("../../etc/passwd"));
        assert!(path.starts_with("/uploads"));
        // No usable extension in the hostile name; falls back to .bin.
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("bin"));
    }

    #[test]
    fn test_upload_guard_removes_file_when_armed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("upload.bin");
        std::fs::write(&path, b"data").expect("write");

        drop(UploadGuard::new(path.clone()));
        assert!(!path.exists());
    }

    #[test]
    fn test_upload_guard_keeps_file_when_disarmed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("upload.bin");
        std::fs::write(&path, b"data").expect("write");

        let mut guard = UploadGuard::new(path.clone());
        guard.disarm();
        drop(guard);
        assert!(path.exists());
    }
}
