// crates/core/src/jobs/script.rs
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use super::types::JobOutcome;

/// Run an executable with no arguments and classify its exit.
///
/// Output is not captured: scripts write their own log file, which is
/// tailed like any other channel.
pub async fn run_script(label: &str, script: &Path) -> JobOutcome {
    let status = Command::new(script)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(false)
        .status()
        .await;

    match status {
        Ok(status) if status.success() => {
            JobOutcome::success(format!("{label} script completed successfully."))
        }
        Ok(status) => match status.code() {
            Some(code) => JobOutcome::failure(format!(
                "{label} script failed with exit code {code}. Check the {label} log for details."
            )),
            None => JobOutcome::failure(format!("{label} script was terminated by a signal.")),
        },
        Err(e) => {
            tracing::error!(script = %script.display(), error = %e, "failed to spawn script");
            JobOutcome::error(format!("Failed to run {label} script: {e}"))
        }
    }
}
