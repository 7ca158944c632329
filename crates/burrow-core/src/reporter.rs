//! Change-request reporting: the single batch progress comment, the
//! aggregate commit status, and optional per-module source comments.
//!
//! Reporting is observability, not control flow: every provider failure
//! here is logged and swallowed so a comment outage can never change
//! what gets planned or applied. The progress comment is posted once per
//! batch and edited in place afterwards; the stored comment id is the
//! first one ever recorded for the batch, which keeps redelivered events
//! from spawning duplicate threads.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use burrow_state::{BatchRecord, BatchStatus, BatchStore, JobRecord, JobStatus};

use crate::error::Result;
use crate::impact::ImpactSet;
use crate::vcs::{StatusState, VcsClient};

/// Context string attached to the aggregate commit status.
pub const STATUS_CONTEXT: &str = "burrow/plan";

/// Publishes batch progress to the change request.
pub struct CommentReporter {
    batches: Arc<dyn BatchStore>,
}

impl CommentReporter {
    pub fn new(batches: Arc<dyn BatchStore>) -> Self {
        Self { batches }
    }

    /// Post or update the batch's single progress comment.
    ///
    /// Provider failures are logged, never propagated. Store failures
    /// still surface: losing the comment id would fork the thread on the
    /// next update.
    pub async fn publish_progress(
        &self,
        client: &dyn VcsClient,
        batch: &BatchRecord,
        jobs: &[JobRecord],
    ) -> Result<()> {
        let body = render_progress(batch, jobs);

        let known_id = self.batches.get_batch(&batch.batch_id).await?.and_then(|b| b.comment_id);
        let comment_id = match known_id {
            Some(id) => id,
            None => {
                let posted = match client.post_comment(batch.pr_number, &body).await {
                    Ok(id) => id,
                    Err(e) => {
                        warn!(batch_id = %batch.batch_id, error = %e, "progress comment post failed");
                        return Ok(());
                    }
                };
                // First write wins; a racing redelivery keeps the id it
                // stored and we edit that comment instead of ours.
                let stored = self.batches.set_batch_comment_id(&batch.batch_id, posted).await?;
                if stored == posted {
                    return Ok(());
                }
                stored
            }
        };

        if let Err(e) = client.update_comment(comment_id, &body).await {
            warn!(batch_id = %batch.batch_id, comment_id, error = %e, "progress comment update failed");
        }
        Ok(())
    }

    /// Push the aggregate commit status derived from the batch status.
    pub async fn publish_commit_status(&self, client: &dyn VcsClient, batch: &BatchRecord) {
        let state = aggregate_status(batch.status);
        let description = match state {
            StatusState::Pending => "jobs in progress",
            StatusState::Success => "all jobs succeeded",
            StatusState::Failure => "one or more jobs did not succeed",
        };
        if let Err(e) = client
            .set_commit_status(&batch.commit_sha, state, description)
            .await
        {
            warn!(batch_id = %batch.batch_id, error = %e, "commit status update failed");
        }
    }

    /// In group-by-module mode, post one comment per impacted source
    /// project and persist the comment ids for later correlation.
    pub async fn publish_source_groupings(
        &self,
        client: &dyn VcsClient,
        batch: &BatchRecord,
        impact: &ImpactSet,
    ) -> Result<()> {
        let mut details: HashMap<String, i64> = HashMap::new();
        // Walk the impact order so comments land in a stable sequence.
        for project in &impact.projects {
            let Some(files) = impact.source_mapping.get(project) else {
                continue;
            };
            let body = render_source_group(project, files);
            match client.post_comment(batch.pr_number, &body).await {
                Ok(id) => {
                    details.insert(project.clone(), id);
                }
                Err(e) => {
                    warn!(batch_id = %batch.batch_id, project, error = %e, "source comment post failed");
                }
            }
        }
        if details.is_empty() {
            return Ok(());
        }
        debug!(batch_id = %batch.batch_id, groups = details.len(), "source groupings published");
        self.batches
            .set_batch_source_details(&batch.batch_id, serde_json::json!(details))
            .await?;
        Ok(())
    }
}

/// Map a batch status onto the provider's three-state commit status.
pub fn aggregate_status(status: BatchStatus) -> StatusState {
    match status {
        BatchStatus::Created | BatchStatus::Running => StatusState::Pending,
        BatchStatus::Succeeded => StatusState::Success,
        BatchStatus::Failed | BatchStatus::PartiallySucceeded => StatusState::Failure,
    }
}

fn job_status_label(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Queued => "queued",
        JobStatus::Blocked => "blocked on project lock",
        JobStatus::Locked => "lock held",
        JobStatus::Running => "running",
        JobStatus::Succeeded => "succeeded",
        JobStatus::Failed => "failed",
    }
}

fn render_progress(batch: &BatchRecord, jobs: &[JobRecord]) -> String {
    let mut body = format!(
        "### Burrow run for `{}` @ `{}`\n\n",
        batch.branch, batch.commit_sha
    );
    for job in jobs {
        body.push_str(&format!(
            "- **{}**: {}\n",
            job.project_name,
            job_status_label(job.status)
        ));
    }
    body
}

fn render_source_group(project: &str, files: &[String]) -> String {
    let mut body = format!("### `{project}`\n\nChanged files:\n");
    for file in files {
        body.push_str(&format!("- `{file}`\n"));
    }
    body
}
