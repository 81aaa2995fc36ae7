// crates/server/src/routes/files.rs
//! Sandboxed file browser endpoints.
//!
//! File operations block on disk I/O, so each one runs on the blocking
//! pool rather than on a runtime worker.

use std::io::Cursor;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use mc_dashboard_core::files::DEFAULT_UPLOAD_DIR;
use mc_dashboard_core::{CoreResult, DirEntry, OpStatus, UploadOutcome};
use serde::{Deserialize, Serialize};

use super::ActionResponse;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_list_path")]
    pub path: String,
}

fn default_list_path() -> String {
    ".".to_string()
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub status: OpStatus,
    pub path: String,
    pub contents: Vec<DirEntry>,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub path: String,
    pub new_name: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: OpStatus,
    #[serde(flatten)]
    pub outcome: UploadOutcome,
}

/// Run a file operation on the blocking pool.
async fn blocking<T, F>(state: &Arc<AppState>, op: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> CoreResult<T> + Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || op(&state))
        .await
        .map_err(|e| ApiError::Internal(format!("file operation task failed: {e}")))?
        .map_err(ApiError::from)
}

/// GET /api/files?path= - List a directory, or the sandbox roots for `:roots:`.
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<ListResponse>> {
    let path = query.path.clone();
    let contents = blocking(&state, move |s| s.files.list(&path)).await?;
    Ok(Json(ListResponse {
        status: OpStatus::Success,
        path: query.path,
        contents,
    }))
}

/// POST /api/move - Move a file or directory.
pub async fn move_file(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MoveRequest>,
) -> ApiResult<Json<ActionResponse>> {
    let message = blocking(&state, move |s| {
        s.files.move_item(&req.source, &req.destination)
    })
    .await?;
    Ok(Json(ActionResponse::success(message)))
}

/// POST /api/rename - Rename an entry within its directory.
pub async fn rename_item(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RenameRequest>,
) -> ApiResult<Json<ActionResponse>> {
    let message = blocking(&state, move |s| s.files.rename(&req.path, &req.new_name)).await?;
    Ok(Json(ActionResponse::success(message)))
}

/// POST /api/upload - Multipart upload of one or more `file` parts.
///
/// An optional `destination` text field picks the target folder
/// (default `plugins`). One file answers with its own result; several
/// files answer with a batch report whose status may be `partial_success`.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    let mut files: Vec<(String, Bytes)> = Vec::new();
    let mut destination: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await?;
                files.push((filename, data));
            }
            Some("destination") => {
                let value = field.text().await?;
                if !value.trim().is_empty() {
                    destination = Some(value);
                }
            }
            other => {
                tracing::debug!(field = ?other, "ignoring multipart field");
            }
        }
    }

    let destination = destination.unwrap_or_else(|| DEFAULT_UPLOAD_DIR.to_string());
    match files.len() {
        0 => Err(ApiError::BadRequest("No file part in request.".to_string())),
        1 => {
            let (filename, data) = files.remove(0);
            let outcome = blocking(&state, move |s| {
                s.files.upload(Cursor::new(data), &filename, &destination)
            })
            .await?;
            Ok(Json(UploadResponse {
                status: OpStatus::Success,
                outcome,
            })
            .into_response())
        }
        _ => {
            let report = blocking(&state, move |s| {
                let readers = files.into_iter().map(|(name, data)| (name, Cursor::new(data)));
                Ok(s.files.upload_batch(readers, &destination))
            })
            .await?;
            let status = match report.status {
                OpStatus::Error => StatusCode::BAD_REQUEST,
                OpStatus::Success | OpStatus::PartialSuccess => StatusCode::OK,
            };
            Ok((status, Json(report)).into_response())
        }
    }
}

pub fn router(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route("/files", get(list_files))
        .route("/move", post(move_file))
        .route("/rename", post(rename_item))
        .route(
            "/upload",
            post(upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
}
