// crates/server/src/routes/backup.rs
//! Backup trigger endpoint.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use mc_dashboard_core::BACKUP_JOB;

use super::ActionResponse;
use crate::error::ApiResult;
use crate::state::AppState;

/// POST /api/run_backup - Start the backup script in the background.
///
/// Returns:
/// - 202 Accepted: the run started; completion arrives as a `jobCompleted` event
/// - 404 Not Found: the backup script does not exist
/// - 409 Conflict: a backup is already running (the request is dropped, not queued)
pub async fn run_backup(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    let handle = state
        .jobs
        .start_script(BACKUP_JOB, &state.layout.backup_script)?;
    tracing::info!(
        job = %handle.job_name,
        started_at = %handle.started_at,
        "backup triggered via API"
    );

    let response = ActionResponse::success(
        "Backup started. Follow the backup log for progress.".to_string(),
    );
    Ok((StatusCode::ACCEPTED, Json(response)).into_response())
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/run_backup", post(run_backup))
}
