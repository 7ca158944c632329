//! Batch execution coordination: job state transitions, per-project
//! locking around active jobs, and the fold of job outcomes into the
//! batch status.
//!
//! A job blocked on its project lock never fails the batch by itself and
//! never affects its siblings; the batch stays live until every job has
//! reached a terminal or blocked state.

use std::sync::Arc;

use tracing::{info, warn};

use burrow_state::{
    lock_namespace, BatchRecord, BatchStatus, BatchStore, JobRecord, JobStatus,
};

use crate::error::{BurrowError, Result};
use crate::locks::LockManager;

/// Drives jobs through their lifecycle and keeps the batch status in sync.
pub struct BatchCoordinator {
    batches: Arc<dyn BatchStore>,
    locks: LockManager,
}

impl BatchCoordinator {
    pub fn new(batches: Arc<dyn BatchStore>, locks: LockManager) -> Self {
        Self { batches, locks }
    }

    /// Persist a batch with its jobs atomically.
    pub async fn create_batch(&self, batch: BatchRecord, jobs: Vec<JobRecord>) -> Result<()> {
        let batch_id = batch.batch_id.clone();
        self.batches.create_batch_with_jobs(batch, jobs).await?;
        info!(batch_id, "batch created");
        Ok(())
    }

    /// Move a queued job to Running, taking its project lock first.
    ///
    /// A lock held elsewhere moves the job to Blocked and returns the
    /// error; sibling jobs are untouched.
    pub async fn start_job(&self, batch: &BatchRecord, job: &JobRecord) -> Result<()> {
        let namespace = lock_namespace(&batch.repo_full_name, &job.project_name);

        if let Err(err) = self
            .locks
            .acquire(&batch.organization_id, &namespace, &job.job_id)
            .await
        {
            warn!(job_id = %job.job_id, namespace, "job blocked on project lock");
            self.batches.update_job_status(&job.job_id, JobStatus::Blocked).await?;
            return Err(err);
        }
        self.batches.update_job_status(&job.job_id, JobStatus::Locked).await?;

        self.batches.update_job_status(&job.job_id, JobStatus::Running).await?;
        self.batches
            .update_batch_status(&batch.batch_id, BatchStatus::Running)
            .await?;
        info!(job_id = %job.job_id, project = %job.project_name, "job running");
        Ok(())
    }

    /// Record a job's terminal outcome, release its project lock, and
    /// fold the batch status from its jobs' states.
    pub async fn complete_job(
        &self,
        batch: &BatchRecord,
        job: &JobRecord,
        outcome: JobStatus,
    ) -> Result<BatchStatus> {
        if !outcome.is_terminal() {
            return Err(BurrowError::Planning(format!(
                "job completion requires a terminal status, got {outcome:?}"
            )));
        }
        self.batches.update_job_status(&job.job_id, outcome).await?;

        let namespace = lock_namespace(&batch.repo_full_name, &job.project_name);
        self.locks
            .release(&batch.organization_id, &namespace, &job.job_id)
            .await?;

        let jobs = self.batches.get_jobs(&batch.batch_id).await?;
        let status = fold_batch_status(&jobs);
        self.batches.update_batch_status(&batch.batch_id, status).await?;
        info!(job_id = %job.job_id, batch_id = %batch.batch_id, ?status, "job completed");
        Ok(status)
    }
}

/// Derive a batch status from its jobs' states.
///
/// Blocked counts as settled-but-not-succeeded: a batch whose last live
/// job blocks must not report full success.
fn fold_batch_status(jobs: &[JobRecord]) -> BatchStatus {
    let all_settled = jobs
        .iter()
        .all(|j| j.status.is_terminal() || j.status == JobStatus::Blocked);
    if !all_settled {
        return BatchStatus::Running;
    }

    let succeeded = jobs.iter().filter(|j| j.status == JobStatus::Succeeded).count();
    if succeeded == jobs.len() {
        BatchStatus::Succeeded
    } else if succeeded == 0 {
        BatchStatus::Failed
    } else {
        BatchStatus::PartiallySucceeded
    }
}
