//! API route handlers for the dashboard server.

pub mod backup;
pub mod events;
pub mod files;
pub mod health;
pub mod server;

use std::sync::Arc;

use axum::Router;
use mc_dashboard_core::OpStatus;
use serde::Serialize;

use crate::state::AppState;

/// Body of a successful action: `{status: "success", message}`.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ActionResponse {
    pub status: OpStatus,
    pub message: String,
}

impl ActionResponse {
    pub fn success(message: String) -> Self {
        Self {
            status: OpStatus::Success,
            message,
        }
    }
}

/// Create the combined API router with all routes under /api prefix.
///
/// Routes:
/// - GET  /api/health - Health check
/// - POST /api/start_server - Start the game server in its tmux pane
/// - POST /api/stop_server - Stop the game server
/// - POST /api/send_command - Type a console command
/// - GET  /api/server_status - Whether the server process is alive
/// - POST /api/run_backup - Start a backup run
/// - GET  /api/files - List a sandboxed directory
/// - POST /api/move - Move a file or directory
/// - POST /api/rename - Rename a file or directory
/// - POST /api/upload - Multipart upload
/// - WS   /api/events - Log and job event stream
pub fn api_routes(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", server::router())
        .nest("/api", backup::router())
        .nest("/api", files::router(max_upload_bytes))
        .nest("/api", events::router())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_dashboard_core::{BridgeConfig, Layout};

    #[tokio::test]
    async fn test_api_routes_creation() {
        let home = tempfile::tempdir().unwrap();
        let state = AppState::new(Layout::from_home(home.path()), BridgeConfig::default()).unwrap();
        let _router = api_routes(state, 1024);
    }

    #[test]
    fn action_response_shape() {
        let json = serde_json::to_value(ActionResponse::success("done".into())).unwrap();
        assert_eq!(json, serde_json::json!({"status": "success", "message": "done"}));
    }
}
