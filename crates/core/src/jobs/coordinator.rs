// crates/core/src/jobs/coordinator.rs
//! At-most-one execution per job name.

use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use super::script::run_script;
use super::types::{JobHandle, JobOutcome, JobRun};
use crate::broadcast::{Broadcaster, ViewerEvent};
use crate::error::{CoreError, CoreResult};

type RunningSet = Arc<Mutex<HashSet<String>>>;

fn lock(running: &RunningSet) -> MutexGuard<'_, HashSet<String>> {
    // The set holds plain names; a panic while holding it cannot leave it torn.
    running.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Releases a job name when the run task ends, however it ends.
struct RunningGuard {
    running: RunningSet,
    job_name: String,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        lock(&self.running).remove(&self.job_name);
    }
}

/// Serializes runs of named jobs.
///
/// A start request for a job that is already running is rejected, not
/// queued. Each run ends with exactly one `jobCompleted` event to all
/// viewers.
pub struct JobCoordinator {
    running: RunningSet,
    broadcaster: Arc<Broadcaster>,
}

impl JobCoordinator {
    pub fn new(broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            running: Arc::new(Mutex::new(HashSet::new())),
            broadcaster,
        }
    }

    pub fn is_running(&self, job_name: &str) -> bool {
        lock(&self.running).contains(job_name)
    }

    /// Start `run` in the background unless `job_name` is already running.
    ///
    /// Never waits for the job. The name is released before the completion
    /// event is published, also when `run` panics.
    pub fn try_start<F, Fut>(&self, job_name: impl Into<String>, run: F) -> CoreResult<JobHandle>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = JobOutcome> + Send + 'static,
    {
        let job_name = job_name.into();
        if !lock(&self.running).insert(job_name.clone()) {
            tracing::info!(job = %job_name, "start rejected, job already running");
            return Err(CoreError::AlreadyInProgress { job: job_name });
        }

        let guard = RunningGuard {
            running: Arc::clone(&self.running),
            job_name: job_name.clone(),
        };
        let broadcaster = Arc::clone(&self.broadcaster);
        let started_at = Utc::now();
        let name = job_name.clone();
        tracing::info!(job = %job_name, "job started");

        let task = tokio::spawn(async move {
            let outcome = match tokio::spawn(run()).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(job = %name, error = %e, "job task crashed");
                    JobOutcome::error(format!("{name} crashed: {e}"))
                }
            };
            drop(guard);

            let mut run = JobRun {
                job_name: name,
                started_at,
                finished_at: Utc::now(),
                status: outcome.status,
                message: outcome.message,
            };
            let secs = run.elapsed().num_milliseconds() as f64 / 1000.0;
            run.message = format!("{} (took {secs:.1}s)", run.message);
            tracing::info!(
                job = %run.job_name,
                status = ?run.status,
                message = %run.message,
                "job finished"
            );

            broadcaster.broadcast(ViewerEvent::JobCompleted {
                job_name: run.job_name.clone(),
                status: run.status,
                message: run.message.clone(),
            });
            run
        });

        Ok(JobHandle::new(job_name, started_at, task))
    }

    /// Run the executable at `script` as `job_name`.
    ///
    /// A missing script is reported before the job name is claimed.
    pub fn start_script(&self, job_name: &str, script: &Path) -> CoreResult<JobHandle> {
        if !script.is_file() {
            return Err(CoreError::not_found("Script", script));
        }
        let script = script.to_path_buf();
        let label = job_name.to_string();
        self.try_start(job_name, move || async move { run_script(&label, &script).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Viewer;
    use crate::jobs::{JobStatus, BACKUP_JOB};
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn coordinator() -> (JobCoordinator, Viewer) {
        let broadcaster = Arc::new(Broadcaster::new(std::iter::empty()));
        let viewer = broadcaster.connect();
        (JobCoordinator::new(broadcaster), viewer)
    }

    async fn next_event(viewer: &mut Viewer) -> ViewerEvent {
        tokio::time::timeout(Duration::from_secs(5), viewer.events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("broadcaster dropped")
    }

    #[tokio::test]
    async fn second_start_is_rejected_until_first_finishes() {
        let (jobs, _viewer) = coordinator();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let handle = jobs
            .try_start(BACKUP_JOB, move || async move {
                let _ = release_rx.await;
                JobOutcome::success("done")
            })
            .unwrap();
        assert!(jobs.is_running(BACKUP_JOB));

        let err = jobs
            .try_start(BACKUP_JOB, || async { JobOutcome::success("never") })
            .unwrap_err();
        assert!(matches!(err, CoreError::AlreadyInProgress { .. }));

        release_tx.send(()).unwrap();
        let run = handle.wait().await.unwrap();
        assert_eq!(run.status, JobStatus::Success);
        assert!(!jobs.is_running(BACKUP_JOB));

        let third = jobs.try_start(BACKUP_JOB, || async { JobOutcome::success("again") });
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn different_jobs_run_concurrently() {
        let (jobs, _viewer) = coordinator();
        let (tx, rx) = oneshot::channel::<()>();
        let a = jobs
            .try_start("a", move || async move {
                let _ = rx.await;
                JobOutcome::success("a")
            })
            .unwrap();
        let b = jobs.try_start("b", || async { JobOutcome::success("b") }).unwrap();
        assert_eq!(b.wait().await.unwrap().status, JobStatus::Success);
        tx.send(()).unwrap();
        a.wait().await.unwrap();
    }

    #[tokio::test]
    async fn completion_event_published_once() {
        let (jobs, mut viewer) = coordinator();
        let handle = jobs
            .try_start(BACKUP_JOB, || async { JobOutcome::failure("exit code 3") })
            .unwrap();
        handle.wait().await.unwrap();

        match next_event(&mut viewer).await {
            ViewerEvent::JobCompleted {
                job_name,
                status,
                message,
            } => {
                assert_eq!(job_name, BACKUP_JOB);
                assert_eq!(status, JobStatus::Failure);
                assert!(message.starts_with("exit code 3 (took "));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(viewer.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn panicking_job_releases_lock_and_reports_error() {
        let (jobs, mut viewer) = coordinator();
        let handle = jobs
            .try_start(BACKUP_JOB, || async {
                if BACKUP_JOB.len() > 1 {
                    panic!("boom");
                }
                JobOutcome::success("unreachable")
            })
            .unwrap();

        let run = handle.wait().await.unwrap();
        assert_eq!(run.status, JobStatus::Error);
        assert!(!jobs.is_running(BACKUP_JOB));
        assert!(matches!(
            next_event(&mut viewer).await,
            ViewerEvent::JobCompleted {
                status: JobStatus::Error,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn missing_script_is_not_found_and_does_not_claim() {
        let (jobs, _viewer) = coordinator();
        let tmp = tempfile::tempdir().unwrap();
        let err = jobs
            .start_script(BACKUP_JOB, &tmp.path().join("backup.sh"))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
        assert!(!jobs.is_running(BACKUP_JOB));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn script_exit_code_decides_status() {
        use std::os::unix::fs::PermissionsExt;

        let (jobs, _viewer) = coordinator();
        let tmp = tempfile::tempdir().unwrap();
        let ok = tmp.path().join("ok.sh");
        let bad = tmp.path().join("bad.sh");
        std::fs::write(&ok, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::write(&bad, "#!/bin/sh\nexit 7\n").unwrap();
        for p in [&ok, &bad] {
            std::fs::set_permissions(p, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let run = jobs.start_script("ok", &ok).unwrap().wait().await.unwrap();
        assert_eq!(run.status, JobStatus::Success);

        let run = jobs.start_script("bad", &bad).unwrap().wait().await.unwrap();
        assert_eq!(run.status, JobStatus::Failure);
        assert!(run.message.contains("exit code 7"));
    }
}
