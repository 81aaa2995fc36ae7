//! Centralized filesystem layout for the supervised server.
//!
//! Single source of truth for where the server lives, where its logs are
//! written and which directories the file browser may touch.

use std::path::{Path, PathBuf};

use crate::tail::LogSource;

pub const CONSOLE_CHANNEL: &str = "console";
pub const BACKUP_CHANNEL: &str = "backup";

/// Sub-folders of the server directory exposed in the file browser.
const SANDBOX_SUBDIRS: [&str; 3] = ["plugins", "old_plugins", "old_paper"];

/// Resolved paths for one installation, derived from a home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub home: PathBuf,
    pub server_dir: PathBuf,
    pub start_script: PathBuf,
    pub console_log: PathBuf,
    pub backup_dir: PathBuf,
    pub backup_log: PathBuf,
    pub backup_script: PathBuf,
}

impl Layout {
    pub fn from_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let server_dir = home.join("minecraft");
        let backup_dir = home.join("backup");
        Self {
            start_script: server_dir.join("start.sh"),
            console_log: server_dir.join("logs").join("latest.log"),
            backup_log: backup_dir.join("backup_latest.log"),
            backup_script: home.join("backup.sh"),
            server_dir,
            backup_dir,
            home,
        }
    }

    /// Layout rooted at the current user's home directory.
    pub fn default_home() -> Option<Self> {
        dirs::home_dir().map(Self::from_home)
    }

    /// Directories the file browser may operate in. The first entry is the
    /// base that relative paths resolve against.
    pub fn sandbox_roots(&self) -> Vec<PathBuf> {
        std::iter::once(self.server_dir.clone())
            .chain(SANDBOX_SUBDIRS.iter().map(|d| self.server_dir.join(d)))
            .collect()
    }

    pub fn log_sources(&self) -> Vec<LogSource> {
        vec![
            LogSource::new(CONSOLE_CHANNEL, &self.console_log),
            LogSource::new(BACKUP_CHANNEL, &self.backup_log),
        ]
    }

    /// Create the directories the tailed log files live in, so the
    /// supervised process and the backup script can write there.
    pub fn ensure_log_dirs(&self) -> std::io::Result<()> {
        for log in [&self.console_log, &self.backup_log] {
            if let Some(parent) = log.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    /// Command line typed into the server's session to launch it.
    pub fn start_command(&self) -> String {
        format!("bash {}", shell_quote(&self.start_script))
    }
}

fn shell_quote(path: &Path) -> String {
    let s = path.display().to_string();
    if s.chars()
        .all(|c| c.is_ascii_alphanumeric() || "/._-+".contains(c))
    {
        s
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}
