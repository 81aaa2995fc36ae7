// crates/core/src/jobs/mod.rs
//! Singleton background jobs.
//!
//! Provides:
//! - `JobCoordinator` - rejects overlapping runs of the same job and
//!   announces every finished run to all viewers
//! - `run_script` - runs an external script and maps its exit status
//! - `JobRun` / `JobOutcome` / `JobStatus` - what a run reports

pub mod coordinator;
pub mod script;
pub mod types;

pub use coordinator::JobCoordinator;
pub use script::run_script;
pub use types::{JobHandle, JobOutcome, JobRun, JobStatus, BACKUP_JOB};
