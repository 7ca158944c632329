//! Capability surface required from the VCS provider.
//!
//! The provider API client is an external collaborator; the orchestrator
//! only depends on these traits. Implementations are expected to apply
//! bounded timeouts to every outbound call and surface timeouts as
//! transient `Vcs` errors.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// Source branch and head commit of a change request.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchInfo {
    pub branch: String,
    pub head_sha: String,
}

/// Aggregate status signal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusState {
    Pending,
    Success,
    Failure,
}

impl StatusState {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusState::Pending => "pending",
            StatusState::Success => "success",
            StatusState::Failure => "failure",
        }
    }
}

/// Scoped client for one installation + repository.
#[async_trait]
pub trait VcsClient: Send + Sync {
    /// Changed file paths of a change request, relative to the repo root.
    async fn get_changed_files(&self, pr_number: i64) -> Result<Vec<String>>;

    /// Source branch name and head commit SHA of a change request.
    async fn get_branch_info(&self, pr_number: i64) -> Result<BranchInfo>;

    /// Full names of the repositories visible to this installation.
    async fn list_installation_repos(&self) -> Result<Vec<String>>;

    /// Post a new comment; returns the provider's comment id.
    async fn post_comment(&self, pr_number: i64, body: &str) -> Result<i64>;

    /// Update an existing comment in place.
    async fn update_comment(&self, comment_id: i64, body: &str) -> Result<()>;

    /// Set the aggregate status on a commit.
    async fn set_commit_status(
        &self,
        sha: &str,
        state: StatusState,
        description: &str,
    ) -> Result<()>;

    /// Short-lived installation token for cloning, when available.
    fn installation_token(&self) -> Option<String>;
}

/// Produces scoped clients and answers user-scoped queries.
#[async_trait]
pub trait VcsClientProvider: Send + Sync {
    /// Client scoped to one installation and repository.
    async fn client_for(
        &self,
        installation_id: i64,
        repo_full_name: &str,
    ) -> Result<Arc<dyn VcsClient>>;

    /// Installation ids visible to the user behind `access_token`. Used by
    /// callback validation to prove the caller controls the installation.
    async fn list_user_installations(&self, access_token: &str) -> Result<Vec<i64>>;
}
