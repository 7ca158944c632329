//! Job planning: impacted projects → job descriptors, plus the aggregate
//! plan-vs-apply classification.

use serde::{Deserialize, Serialize};

use burrow_state::BatchType;

use crate::config::RepoConfig;
use crate::error::{BurrowError, Result};
use crate::impact::ImpactSet;

/// Command carried by plan jobs.
pub const PLAN_COMMAND: &str = "digger plan";
/// Command carried by apply jobs.
pub const APPLY_COMMAND: &str = "digger apply";

/// The command a triggering event resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerCommand {
    Plan,
    Apply,
    Lock,
    Unlock,
}

impl TriggerCommand {
    /// Parse a comment-issued command. PR open/synchronize events default
    /// to [`TriggerCommand::Plan`] without going through here.
    pub fn parse(comment: &str) -> Result<Self> {
        match comment.trim() {
            "digger plan" => Ok(TriggerCommand::Plan),
            "digger apply" => Ok(TriggerCommand::Apply),
            "digger lock" => Ok(TriggerCommand::Lock),
            "digger unlock" => Ok(TriggerCommand::Unlock),
            other => Err(BurrowError::Planning(format!(
                "unknown command: {other}"
            ))),
        }
    }

    /// Lock and unlock never produce executable jobs; the side effect is
    /// performed directly and batch creation is skipped.
    pub fn is_lock_action(self) -> bool {
        matches!(self, TriggerCommand::Lock | TriggerCommand::Unlock)
    }

    fn job_command(self) -> &'static str {
        match self {
            TriggerCommand::Plan => PLAN_COMMAND,
            TriggerCommand::Apply => APPLY_COMMAND,
            // Lock actions short-circuit before job construction.
            TriggerCommand::Lock | TriggerCommand::Unlock => unreachable!("no job for lock action"),
        }
    }
}

/// The context a change event resolved to before planning.
#[derive(Debug, Clone)]
pub struct TriggerContext {
    pub command: TriggerCommand,
    pub branch: String,
    pub commit_sha: String,
    pub pr_number: i64,
    pub draft: bool,
}

/// One project's command execution descriptor. Ephemeral: constructed per
/// resolution, persisted only as part of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub project_name: String,
    pub commands: Vec<String>,
    pub branch: String,
    pub commit_sha: String,
    pub pr_number: i64,
}

/// Build one job per impacted project.
///
/// Returns no jobs for draft changes (unless the config allows drafts)
/// and for lock actions; callers treat an empty plan as a deliberate
/// skip, not an error.
pub fn plan_jobs(ctx: &TriggerContext, impact: &ImpactSet, config: &RepoConfig) -> Vec<Job> {
    if ctx.command.is_lock_action() {
        return Vec::new();
    }
    if ctx.draft && !config.allow_draft_prs {
        return Vec::new();
    }

    impact
        .projects
        .iter()
        .map(|project| Job {
            project_name: project.clone(),
            commands: vec![ctx.command.job_command().to_string()],
            branch: ctx.branch.clone(),
            commit_sha: ctx.commit_sha.clone(),
            pr_number: ctx.pr_number,
        })
        .collect()
}

/// Classify a job set: Apply only when every job's command list contains
/// an apply command, otherwise Plan. An empty set is Unknown.
pub fn batch_type(jobs: &[Job]) -> BatchType {
    if jobs.is_empty() {
        return BatchType::Unknown;
    }
    let all_apply = jobs
        .iter()
        .all(|job| job.commands.iter().any(|c| c == APPLY_COMMAND));
    if all_apply {
        BatchType::Apply
    } else {
        BatchType::Plan
    }
}
