// crates/server/src/routes/health.rs
//! Liveness of the dashboard itself, not of the game server.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use mc_dashboard_core::BACKUP_JOB;
use serde::Serialize;

use crate::state::AppState;

/// Per-channel view of the log fan-out.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ChannelHealth {
    pub name: String,
    /// Bytes of the log published so far; the backlog boundary.
    pub offset: u64,
    pub subscribers: usize,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub viewers: usize,
    pub channels: Vec<ChannelHealth>,
    pub backup_running: bool,
}

/// GET /api/health - Dashboard health: viewers, log channels, backup lock.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let broadcaster = &state.broadcaster;
    let channels = broadcaster
        .channels()
        .into_iter()
        .map(|name| ChannelHealth {
            offset: broadcaster.published_offset(&name).unwrap_or(0),
            subscribers: broadcaster.subscriber_count(&name),
            name,
        })
        .collect();

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_secs(),
        viewers: broadcaster.viewer_count(),
        channels,
        backup_running: state.jobs.is_running(BACKUP_JOB),
    })
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health_check))
}
