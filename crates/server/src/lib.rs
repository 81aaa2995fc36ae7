// crates/server/src/lib.rs
//! mc-dashboard server library.
//!
//! Axum transport shell over `mc-dashboard-core`: REST routes for the
//! server, backups and the file browser, a WebSocket event stream, and
//! optional static frontend serving.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::*;
pub use routes::api_routes;
pub use state::AppState;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use mc_dashboard_core::{LogTailer, TailConfig};
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
///
/// This sets up:
/// - API routes under `/api`
/// - Static frontend files at `/` when `static_dir` is given
/// - CORS (allows any origin)
/// - Request tracing
pub fn create_app(
    state: Arc<AppState>,
    static_dir: Option<PathBuf>,
    max_upload_bytes: usize,
) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new().merge(api_routes(state, max_upload_bytes));
    if let Some(dir) = static_dir {
        tracing::info!(path = %dir.display(), "serving static files");
        app = app.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
    }

    app.layer(cors).layer(TraceLayer::new_for_http())
}

/// Start one tailer per registered log channel, feeding the broadcaster.
pub async fn spawn_tailers(state: &AppState, config: TailConfig) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();
    for source in state.layout.log_sources() {
        tracing::info!(
            channel = %source.channel(),
            path = %source.path().display(),
            "starting log tailer"
        );
        let tailer = LogTailer::start(source, config).await;
        handles.push(tailer.spawn(Arc::clone(&state.broadcaster)));
    }
    handles
}
