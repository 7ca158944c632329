//! Store trait definitions for Burrow.
//!
//! These traits define the persistence contracts the orchestrator depends
//! on:
//! - `InstallationStore`: organizations, installation links, app records
//! - `RepoStore`: linked repositories and their stored config
//! - `BatchStore`: batches and their jobs
//! - `LockStore`: per-project mutual exclusion claims
//!
//! All traits are async and backend-agnostic; components receive them as
//! injected `Arc<dyn ...>` values at construction, never through a process
//! global. In-memory fakes are provided for testing via the `fakes` module.
//!
//! Webhook deliveries are at-least-once and concurrent, so every write here
//! must be idempotent or backed by a store-level uniqueness constraint
//! rather than an in-process check-then-act.

use async_trait::async_trait;
use chrono::Duration;

use crate::error::StateResult;
use crate::records::{
    AppRecord, BatchRecord, BatchStatus, InstallationLinkRecord, InstallationRepoRecord,
    JobRecord, JobStatus, LockRecord, OrganizationRecord, RepoRecord,
};

/// Organizations, installation links, and app credentials.
#[async_trait]
pub trait InstallationStore: Send + Sync {
    /// Create a new tenant organization.
    async fn create_organization(&self, name: &str) -> StateResult<OrganizationRecord>;

    /// Fetch an organization by id.
    async fn get_organization(&self, org_id: &str) -> StateResult<Option<OrganizationRecord>>;

    /// Link an installation to an organization.
    ///
    /// Idempotent: if an active link for this installation id already
    /// exists, it is returned unchanged (no-op success, not an error).
    async fn link_installation(
        &self,
        org_id: &str,
        installation_id: i64,
    ) -> StateResult<InstallationLinkRecord>;

    /// Fetch the active link for an installation id.
    async fn get_link(&self, installation_id: i64) -> StateResult<Option<InstallationLinkRecord>>;

    /// Mark an installation link inactive. The record is kept, not deleted.
    async fn deactivate_link(&self, installation_id: i64) -> StateResult<()>;

    /// Record that a repository was added to an installation. Reactivates
    /// an existing inactive record rather than duplicating it.
    async fn record_repo_added(
        &self,
        installation_id: i64,
        app_id: i64,
        account_login: &str,
        account_id: i64,
        repo_full_name: &str,
    ) -> StateResult<InstallationRepoRecord>;

    /// Record that a repository was removed from an installation.
    async fn record_repo_removed(
        &self,
        installation_id: i64,
        app_id: i64,
        repo_full_name: &str,
    ) -> StateResult<()>;

    /// Persist app credentials obtained from the manifest exchange.
    async fn create_app(&self, app: AppRecord) -> StateResult<AppRecord>;
}

/// Linked repositories and their stored declarative config.
#[async_trait]
pub trait RepoStore: Send + Sync {
    /// Fetch a repo by (organization, canonical name).
    async fn get_repo(
        &self,
        org_id: &str,
        canonical_name: &str,
    ) -> StateResult<Option<RepoRecord>>;

    /// Create a repo record.
    ///
    /// Unique per (organization, canonical name). Losing a creation race
    /// to a duplicate webhook delivery is not an error: the existing
    /// record is returned.
    async fn create_repo(&self, repo: RepoRecord) -> StateResult<RepoRecord>;

    /// Replace the stored config text, flagging whether it came from the
    /// default branch.
    async fn update_repo_config(
        &self,
        org_id: &str,
        canonical_name: &str,
        config_yaml: &str,
        main_branch: bool,
    ) -> StateResult<()>;
}

/// Batches and their jobs.
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Persist a batch together with all of its jobs, atomically: either
    /// the whole batch with its full job set is recorded, or nothing is.
    async fn create_batch_with_jobs(
        &self,
        batch: BatchRecord,
        jobs: Vec<JobRecord>,
    ) -> StateResult<()>;

    /// Fetch a batch by id.
    async fn get_batch(&self, batch_id: &str) -> StateResult<Option<BatchRecord>>;

    /// Fetch all jobs of a batch, in creation order.
    async fn get_jobs(&self, batch_id: &str) -> StateResult<Vec<JobRecord>>;

    /// Advance a batch's status.
    async fn update_batch_status(&self, batch_id: &str, status: BatchStatus) -> StateResult<()>;

    /// Store the progress comment id. First write wins: returns the id
    /// already stored on re-entry so reporting stays idempotent.
    async fn set_batch_comment_id(&self, batch_id: &str, comment_id: i64) -> StateResult<i64>;

    /// Attach grouped-comment identifiers for later correlation.
    async fn set_batch_source_details(
        &self,
        batch_id: &str,
        details: serde_json::Value,
    ) -> StateResult<()>;

    /// Advance a job's status.
    async fn update_job_status(&self, job_id: &str, status: JobStatus) -> StateResult<()>;
}

/// Per-project mutual exclusion claims with bounded leases.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Try to claim (organization, namespace) for `holder`.
    ///
    /// Returns true when the claim is granted. Re-acquisition by the
    /// current holder extends the lease. An expired lease may be stolen
    /// by any holder. A live lease held by someone else returns false.
    async fn try_acquire(
        &self,
        org_id: &str,
        namespace: &str,
        holder: &str,
        lease: Duration,
    ) -> StateResult<bool>;

    /// Release a claim. Only the current holder may release; releasing a
    /// lock that is absent or held by another holder is a no-op.
    async fn release(&self, org_id: &str, namespace: &str, holder: &str) -> StateResult<()>;

    /// Inspect the current claim, if any.
    async fn get(&self, org_id: &str, namespace: &str) -> StateResult<Option<LockRecord>>;
}
