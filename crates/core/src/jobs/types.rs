// crates/core/src/jobs/types.rs
//! Types for coordinated job runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

/// Name the backup script runs under.
pub const BACKUP_JOB: &str = "backup";

/// Terminal status of a job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// The job ran and reported success.
    Success,
    /// The job ran and reported failure (e.g. non-zero exit).
    Failure,
    /// The job could not be run, or crashed.
    Error,
}

/// What a job body reports when it returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub status: JobStatus,
    pub message: String,
}

impl JobOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Success,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failure,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Error,
            message: message.into(),
        }
    }
}

/// One finished execution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRun {
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: JobStatus,
    /// Outcome message with the elapsed time appended.
    pub message: String,
}

impl JobRun {
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Returned by a successful start; the run continues in the background
/// whether or not the handle is kept.
#[derive(Debug)]
pub struct JobHandle {
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    task: JoinHandle<JobRun>,
}

impl JobHandle {
    pub(crate) fn new(
        job_name: String,
        started_at: DateTime<Utc>,
        task: JoinHandle<JobRun>,
    ) -> Self {
        Self {
            job_name,
            started_at,
            task,
        }
    }

    /// Wait for the run to finish. `None` if the runtime shut down first.
    pub async fn wait(self) -> Option<JobRun> {
        self.task.await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&JobStatus::Success).unwrap(), "\"success\"");
        assert_eq!(serde_json::to_string(&JobStatus::Failure).unwrap(), "\"failure\"");
        assert_eq!(serde_json::to_string(&JobStatus::Error).unwrap(), "\"error\"");
    }

    #[test]
    fn elapsed_is_finish_minus_start() {
        let started_at = Utc::now();
        let run = JobRun {
            job_name: BACKUP_JOB.into(),
            started_at,
            finished_at: started_at + chrono::Duration::seconds(3),
            status: JobStatus::Success,
            message: String::new(),
        };
        assert_eq!(run.elapsed().num_seconds(), 3);
    }
}
