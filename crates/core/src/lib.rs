// crates/core/src/lib.rs
pub mod ansi;
pub mod bridge;
pub mod broadcast;
pub mod error;
pub mod files;
pub mod jobs;
pub mod paths;
pub mod sandbox;
pub mod tail;

pub use ansi::strip_ansi;
pub use bridge::{BridgeConfig, ProcessBridge};
pub use broadcast::{Broadcaster, LogLine, Viewer, ViewerEvent, ViewerId};
pub use error::*;
pub use files::{DirEntry, FileOps, OpStatus, UploadBatchReport, UploadOutcome};
pub use jobs::{JobCoordinator, JobHandle, JobOutcome, JobRun, JobStatus, BACKUP_JOB};
pub use paths::Layout;
pub use sandbox::PathSandbox;
pub use tail::{LogSource, LogTailer, TailConfig, TailUpdate};
