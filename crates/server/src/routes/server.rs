// crates/server/src/routes/server.rs
//! Start, stop and talk to the game server through its tmux pane.

use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use mc_dashboard_core::OpStatus;
use serde::{Deserialize, Serialize};

use super::ActionResponse;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SendCommandRequest {
    #[serde(default)]
    pub command: Option<String>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
pub struct ServerStatusResponse {
    pub status: OpStatus,
    pub running: bool,
}

/// POST /api/start_server - Type the start script invocation into the pane.
pub async fn start_server(State(state): State<Arc<AppState>>) -> ApiResult<Json<ActionResponse>> {
    let message = state.bridge.start().await?;
    Ok(Json(ActionResponse::success(message)))
}

/// POST /api/stop_server - Type `stop` into the pane.
pub async fn stop_server(State(state): State<Arc<AppState>>) -> ApiResult<Json<ActionResponse>> {
    let message = state.bridge.stop().await?;
    Ok(Json(ActionResponse::success(message)))
}

/// POST /api/send_command - Type an arbitrary console command.
///
/// A missing body or a null command sends an empty line.
pub async fn send_command(
    State(state): State<Arc<AppState>>,
    body: Option<Json<SendCommandRequest>>,
) -> ApiResult<Json<ActionResponse>> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let message = state.bridge.send_command(req.command.as_deref()).await?;
    Ok(Json(ActionResponse::success(message)))
}

/// GET /api/server_status - Whether the server process is alive.
pub async fn server_status(State(state): State<Arc<AppState>>) -> Json<ServerStatusResponse> {
    Json(ServerStatusResponse {
        status: OpStatus::Success,
        running: state.bridge.is_running().await,
    })
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/start_server", post(start_server))
        .route("/stop_server", post(stop_server))
        .route("/send_command", post(send_command))
        .route("/server_status", get(server_status))
}
