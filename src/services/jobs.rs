//! Background job registry
//!
//! Each policy analysis runs as a job with its own id, status and cancel
//! signal. Jobs are visible only to callers of the scope that started them.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::auth::EnvScope;
use crate::db::models::format_timestamp;
use crate::db::policies::process_status;
use crate::error::NexusError;

/// Finished jobs are forgotten after this long
const RETAIN_FINISHED_MINUTES: i64 = 60;

/// Point-in-time copy of a job
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub job_id: String,
    pub policy_id: i32,
    pub scope: EnvScope,
    pub status: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub error: Option<String>,
}

struct JobEntry {
    snapshot: JobSnapshot,
    finished: Option<DateTime<Utc>>,
    cancel: watch::Sender<bool>,
}

/// Receiving side of a job's cancel signal
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the job is cancelled; never resolves otherwise
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Concurrent map of job id -> job state
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<DashMap<String, JobEntry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new `PENDING` job for a policy
    pub fn register(&self, policy_id: i32, scope: EnvScope) -> (JobSnapshot, CancelToken) {
        self.prune_finished();

        let (tx, rx) = watch::channel(false);
        let snapshot = JobSnapshot {
            job_id: Uuid::new_v4().to_string(),
            policy_id,
            scope,
            status: process_status::PENDING.to_string(),
            started_at: format_timestamp(Utc::now()),
            finished_at: None,
            error: None,
        };
        self.jobs.insert(
            snapshot.job_id.clone(),
            JobEntry {
                snapshot: snapshot.clone(),
                finished: None,
                cancel: tx,
            },
        );
        debug!(job_id = %snapshot.job_id, policy_id, "Job registered");
        (snapshot, CancelToken { rx })
    }

    /// Record a non-terminal status change
    pub fn set_status(&self, job_id: &str, status: &str) {
        if let Some(mut entry) = self.jobs.get_mut(job_id) {
            entry.snapshot.status = status.to_string();
        }
    }

    /// Record the terminal status of a job
    pub fn finish(&self, job_id: &str, status: &str, error: Option<String>) {
        if let Some(mut entry) = self.jobs.get_mut(job_id) {
            let now = Utc::now();
            entry.snapshot.status = status.to_string();
            entry.snapshot.error = error;
            entry.snapshot.finished_at = Some(format_timestamp(now));
            entry.finished = Some(now);
        }
    }

    /// Look up a job within the caller's scope
    pub fn get(&self, job_id: &str, scope: EnvScope) -> Option<JobSnapshot> {
        self.jobs
            .get(job_id)
            .filter(|entry| entry.snapshot.scope == scope)
            .map(|entry| entry.snapshot.clone())
    }

    /// Signal cancellation; finished jobs are returned unchanged
    pub fn cancel(&self, job_id: &str, scope: EnvScope) -> Result<JobSnapshot, NexusError> {
        let entry = self
            .jobs
            .get(job_id)
            .filter(|entry| entry.snapshot.scope == scope)
            .ok_or_else(|| NexusError::NotFound(format!("job {}", job_id)))?;

        if !process_status::is_terminal(&entry.snapshot.status) {
            // send_replace never fails, even with no receiver left
            entry.cancel.send_replace(true);
            debug!(job_id, "Job cancellation requested");
        }
        Ok(entry.snapshot.clone())
    }

    fn prune_finished(&self) {
        let cutoff = Utc::now() - Duration::minutes(RETAIN_FINISHED_MINUTES);
        self.jobs
            .retain(|_, entry| entry.finished.map_or(true, |at| at > cutoff));
    }
}
