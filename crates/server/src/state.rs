// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use mc_dashboard_core::{
    BridgeConfig, Broadcaster, CoreResult, FileOps, JobCoordinator, Layout, PathSandbox,
    ProcessBridge,
};

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Where the server, its logs and the backup script live.
    pub layout: Layout,
    /// Sandboxed file browser.
    pub files: FileOps,
    /// Keystroke bridge into the server's tmux pane.
    pub bridge: ProcessBridge,
    /// Fan-out of log lines and job events to WebSocket viewers.
    pub broadcaster: Arc<Broadcaster>,
    /// Backup runs, at most one at a time.
    pub jobs: JobCoordinator,
}

impl AppState {
    /// Build the state for `layout`, creating the sandbox roots.
    ///
    /// Fails only if a sandbox root cannot be created.
    pub fn new(layout: Layout, bridge: BridgeConfig) -> CoreResult<Arc<Self>> {
        let sandbox = PathSandbox::new(layout.sandbox_roots())?;
        let broadcaster = Arc::new(Broadcaster::new(layout.log_sources()));
        Ok(Arc::new(Self {
            start_time: Instant::now(),
            files: FileOps::new(sandbox),
            bridge: ProcessBridge::new(bridge),
            jobs: JobCoordinator::new(Arc::clone(&broadcaster)),
            broadcaster,
            layout,
        }))
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
