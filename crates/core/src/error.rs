// crates/core/src/error.rs
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse error category surfaced to the transport layer.
///
/// Several [`CoreError`] variants share a kind (a missing tool, a missing
/// tmux session and a missing file are all `NotFound`) while keeping their
/// own message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    AccessDenied,
    AlreadyInProgress,
    Validation,
    Io,
}

/// Errors returned by every core operation.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{tool} command not found. Is {tool} installed and in your PATH?")]
    ToolNotFound { tool: String },

    #[error("Session '{session}' not found: {detail}")]
    SessionNotFound { session: String, detail: String },

    #[error("{what} not found: {path}")]
    NotFound { what: &'static str, path: PathBuf },

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Job '{job}' is already in progress")]
    AlreadyInProgress { job: String },

    #[error("{0}")]
    Validation(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with code {code}: {stderr}")]
    CommandFailed {
        tool: String,
        code: i32,
        stderr: String,
    },
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ToolNotFound { .. } | Self::SessionNotFound { .. } | Self::NotFound { .. } => {
                ErrorKind::NotFound
            }
            Self::AccessDenied(_) => ErrorKind::AccessDenied,
            Self::AlreadyInProgress { .. } => ErrorKind::AlreadyInProgress,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Io { .. } | Self::CommandFailed { .. } => ErrorKind::Io,
        }
    }

    pub fn not_found(what: &'static str, path: impl Into<PathBuf>) -> Self {
        Self::NotFound {
            what,
            path: path.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Classify an I/O failure on `path`.
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::not_found("Path", path),
            std::io::ErrorKind::PermissionDenied => {
                Self::AccessDenied(format!("permission denied on {}", path.display()))
            }
            _ => Self::Io {
                context: format!("I/O error on {}", path.display()),
                source,
            },
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
