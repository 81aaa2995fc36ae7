// crates/server/src/main.rs
//! mc-dashboard server binary.
//!
//! Parses configuration, prepares the filesystem layout, starts one log
//! tailer per channel, then serves the API until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use mc_dashboard_server::{create_app, spawn_tailers, AppState, Config};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "warn,mc_dashboard_server=info,mc_dashboard_core=info";

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).compact().init();

    let config = Config::parse();
    let layout = config.layout()?;

    if let Err(e) = layout.ensure_log_dirs() {
        // Tailers wait for missing files, so this is not fatal.
        tracing::warn!(error = %e, "could not create log directories");
    }

    let bridge = config.bridge_config(&layout);
    let state = AppState::new(layout, bridge).context("failed to prepare sandbox directories")?;

    let tailers = spawn_tailers(&state, config.tail_config()).await;

    let app = create_app(state.clone(), config.static_dir.clone(), config.max_upload_bytes());

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(
        addr = %addr,
        home = %state.layout.home.display(),
        tmux_target = %state.bridge.config().target,
        version = env!("CARGO_PKG_VERSION"),
        "mc-dashboard listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for tailer in tailers {
        tailer.abort();
    }
    tracing::info!("mc-dashboard stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
