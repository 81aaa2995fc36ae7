// crates/server/src/config.rs
//! Command-line and environment configuration.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use mc_dashboard_core::{BridgeConfig, Layout, TailConfig};

/// mc-dashboard - web dashboard for a tmux-hosted Minecraft server.
///
/// Every flag can also be set through its `MC_DASHBOARD_*` environment
/// variable.
#[derive(Parser, Debug, Clone)]
#[command(name = "mc-dashboard", version, about)]
pub struct Config {
    /// Address to listen on.
    #[arg(long, env = "MC_DASHBOARD_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on.
    #[arg(long, env = "MC_DASHBOARD_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Home directory the server layout derives from (defaults to the
    /// current user's home).
    #[arg(long, env = "MC_DASHBOARD_HOME")]
    pub home: Option<PathBuf>,

    /// tmux pane the server runs in.
    #[arg(long, env = "MC_DASHBOARD_TMUX_TARGET", default_value = "mc:0.0")]
    pub tmux_target: String,

    /// tmux executable.
    #[arg(long, env = "MC_DASHBOARD_TMUX_BIN", default_value = "tmux")]
    pub tmux_bin: PathBuf,

    /// Substring identifying the server process in the process table.
    #[arg(long, env = "MC_DASHBOARD_PROCESS_PATTERN", default_value = "paper.jar")]
    pub process_pattern: String,

    /// Directory with frontend files to serve at `/`.
    #[arg(long, env = "MC_DASHBOARD_STATIC_DIR")]
    pub static_dir: Option<PathBuf>,

    /// Log poll interval while a file is being followed.
    #[arg(long, env = "MC_DASHBOARD_POLL_INTERVAL_MS", default_value_t = 100)]
    pub poll_interval_ms: u64,

    /// Poll interval while a log file is missing.
    #[arg(long, env = "MC_DASHBOARD_MISSING_INTERVAL_MS", default_value_t = 2000)]
    pub missing_interval_ms: u64,

    /// Maximum request body size for uploads, in MiB.
    #[arg(long, env = "MC_DASHBOARD_MAX_UPLOAD_MB", default_value_t = 256)]
    pub max_upload_mb: usize,
}

impl Config {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn layout(&self) -> anyhow::Result<Layout> {
        match &self.home {
            Some(home) => Ok(Layout::from_home(home)),
            None => Layout::default_home()
                .ok_or_else(|| anyhow::anyhow!("Could not determine home directory; pass --home")),
        }
    }

    pub fn tail_config(&self) -> TailConfig {
        TailConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            missing_interval: Duration::from_millis(self.missing_interval_ms.max(1)),
        }
    }

    pub fn bridge_config(&self, layout: &Layout) -> BridgeConfig {
        BridgeConfig {
            tmux_bin: self.tmux_bin.clone(),
            target: self.tmux_target.clone(),
            start_command: layout.start_command(),
            process_pattern: self.process_pattern.clone(),
            ..BridgeConfig::default()
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}
