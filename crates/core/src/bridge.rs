//! Drive the supervised server through its tmux pane.
//!
//! Commands are typed into the pane as keystrokes; the server itself is
//! never spawned or signalled from here. Liveness comes from the OS process
//! table.

use std::path::PathBuf;
use std::process::Stdio;

use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tokio::process::Command;

use crate::error::{CoreError, CoreResult};

/// tmux stderr fragments that mean the target does not exist.
const SESSION_MISSING_MARKERS: [&str; 3] = ["can't find", "no server running", "no current"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// tmux executable, looked up on `PATH` when not absolute.
    pub tmux_bin: PathBuf,
    /// Pane target, e.g. `mc:0.0`.
    pub target: String,
    /// Line typed to launch the server.
    pub start_command: String,
    /// Line typed to stop the server.
    pub stop_command: String,
    /// Substring identifying the server in the process table.
    pub process_pattern: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            tmux_bin: PathBuf::from("tmux"),
            target: "mc:0.0".to_string(),
            start_command: "bash start.sh".to_string(),
            stop_command: "stop".to_string(),
            process_pattern: "paper.jar".to_string(),
        }
    }
}

pub struct ProcessBridge {
    config: BridgeConfig,
}

impl ProcessBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn tool_name(&self) -> String {
        self.config.tmux_bin.display().to_string()
    }

    async fn tmux(&self, target: &str, args: &[&str]) -> CoreResult<()> {
        let output = Command::new(&self.config.tmux_bin)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CoreError::ToolNotFound {
                        tool: self.tool_name(),
                    }
                } else {
                    CoreError::Io {
                        context: format!("failed to run {}", self.tool_name()),
                        source: e,
                    }
                }
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if SESSION_MISSING_MARKERS.iter().any(|m| stderr.contains(m)) {
            return Err(CoreError::SessionNotFound {
                session: target.to_string(),
                detail: stderr,
            });
        }
        Err(CoreError::CommandFailed {
            tool: self.tool_name(),
            code: output.status.code().unwrap_or(-1),
            stderr,
        })
    }

    /// Type `text` into `target` and press Enter.
    ///
    /// The text is sent literally, so words like `Enter` or `C-c` are
    /// typed rather than interpreted as keys.
    pub async fn send_line_to(&self, target: &str, text: &str) -> CoreResult<()> {
        if !text.is_empty() {
            self.tmux(target, &["send-keys", "-t", target, "-l", "--", text])
                .await?;
        }
        self.tmux(target, &["send-keys", "-t", target, "C-m"]).await?;
        tracing::debug!(tmux_target = %target, text, "line sent");
        Ok(())
    }

    pub async fn send_line(&self, text: &str) -> CoreResult<()> {
        self.send_line_to(&self.config.target, text).await
    }

    pub async fn start(&self) -> CoreResult<String> {
        self.send_line(&self.config.start_command).await?;
        tracing::info!(tmux_target = %self.config.target, "start command sent");
        Ok("Server start command sent.".to_string())
    }

    pub async fn stop(&self) -> CoreResult<String> {
        self.send_line(&self.config.stop_command).await?;
        tracing::info!(tmux_target = %self.config.target, "stop command sent");
        Ok("Server stop command sent.".to_string())
    }

    /// Send an operator command. `None` presses Enter on an empty line.
    pub async fn send_command(&self, command: Option<&str>) -> CoreResult<String> {
        let command = command.unwrap_or_default();
        self.send_line(command).await?;
        Ok(format!("Command '{command}' sent."))
    }

    /// Whether a process matching the configured pattern is running.
    ///
    /// Always answers: if the process table cannot be read, logs a warning
    /// and returns `false`.
    pub async fn is_running(&self) -> bool {
        let pattern = self.config.process_pattern.clone();
        match tokio::task::spawn_blocking(move || process_table_matches(&pattern)).await {
            Ok(Some(found)) => found,
            Ok(None) => {
                tracing::warn!("process table is empty, cannot probe server liveness");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "liveness probe failed");
                false
            }
        }
    }
}

/// Scan the process table for `pattern` in a process name or command line.
///
/// The dashboard itself is skipped: its own command line usually carries
/// the pattern as a flag value. Returns `None` when no processes are
/// visible at all. Blocking; call from `spawn_blocking`.
pub fn process_table_matches(pattern: &str) -> Option<bool> {
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing().with_cmd(UpdateKind::OnlyIfNotSet),
    );
    if sys.processes().is_empty() {
        return None;
    }

    let me = sysinfo::get_current_pid().ok();
    let own_cmd = me.and_then(|pid| sys.process(pid)).map(|p| p.cmd().to_vec());
    // Threads of this process are listed as tasks parented to it.
    let is_self = |pid: Pid, process: &Process| {
        Some(pid) == me
            || (process.parent() == me && own_cmd.as_deref() == Some(process.cmd()))
    };

    let found = sys.processes().iter().any(|(&pid, process)| {
        if is_self(pid, process) {
            return false;
        }
        if process.name().to_string_lossy().contains(pattern) {
            return true;
        }
        let cmd = process
            .cmd()
            .iter()
            .map(|part| part.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        cmd.contains(pattern)
    });
    Some(found)
}
