//! In-memory fakes for the collaborator traits (testing only)
//!
//! `FakeVcsClient` / `FakeVcsProvider` record outbound provider calls and
//! serve canned answers; `FixtureCloner` materializes a configured file
//! tree instead of running git.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use crate::error::{BurrowError, Result};
use crate::orchestrator::CiBackend;
use crate::vcs::{BranchInfo, StatusState, VcsClient, VcsClientProvider};
use crate::workdir::{ClonedRepo, RepoCloner};

/// A posted comment captured by the fake.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedComment {
    pub comment_id: i64,
    pub pr_number: i64,
    pub body: String,
}

/// A commit status captured by the fake.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStatus {
    pub sha: String,
    pub state: StatusState,
    pub description: String,
}

/// VCS client fake with canned answers and call recording.
#[derive(Debug, Default)]
pub struct FakeVcsClient {
    changed_files: Mutex<Vec<String>>,
    branch_info: Mutex<Option<BranchInfo>>,
    repos: Mutex<Vec<String>>,
    next_comment_id: AtomicI64,
    pub comments: Mutex<Vec<RecordedComment>>,
    pub updates: Mutex<Vec<(i64, String)>>,
    pub statuses: Mutex<Vec<RecordedStatus>>,
}

impl FakeVcsClient {
    pub fn new() -> Self {
        Self {
            next_comment_id: AtomicI64::new(1000),
            ..Self::default()
        }
    }

    pub fn with_changed_files(self, files: &[&str]) -> Self {
        *self.changed_files.lock().unwrap() = files.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_branch_info(self, branch: &str, head_sha: &str) -> Self {
        *self.branch_info.lock().unwrap() = Some(BranchInfo {
            branch: branch.to_string(),
            head_sha: head_sha.to_string(),
        });
        self
    }

    pub fn with_repos(self, repos: &[&str]) -> Self {
        *self.repos.lock().unwrap() = repos.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn comment_count(&self) -> usize {
        self.comments.lock().unwrap().len()
    }

    pub fn last_status(&self) -> Option<RecordedStatus> {
        self.statuses.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl VcsClient for FakeVcsClient {
    async fn get_changed_files(&self, _pr_number: i64) -> Result<Vec<String>> {
        Ok(self.changed_files.lock().unwrap().clone())
    }

    async fn get_branch_info(&self, pr_number: i64) -> Result<BranchInfo> {
        self.branch_info
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| BurrowError::Vcs(format!("no branch info for PR {pr_number}")))
    }

    async fn list_installation_repos(&self) -> Result<Vec<String>> {
        Ok(self.repos.lock().unwrap().clone())
    }

    async fn post_comment(&self, pr_number: i64, body: &str) -> Result<i64> {
        let comment_id = self.next_comment_id.fetch_add(1, Ordering::SeqCst);
        self.comments.lock().unwrap().push(RecordedComment {
            comment_id,
            pr_number,
            body: body.to_string(),
        });
        Ok(comment_id)
    }

    async fn update_comment(&self, comment_id: i64, body: &str) -> Result<()> {
        self.updates
            .lock()
            .unwrap()
            .push((comment_id, body.to_string()));
        Ok(())
    }

    async fn set_commit_status(
        &self,
        sha: &str,
        state: StatusState,
        description: &str,
    ) -> Result<()> {
        self.statuses.lock().unwrap().push(RecordedStatus {
            sha: sha.to_string(),
            state,
            description: description.to_string(),
        });
        Ok(())
    }

    fn installation_token(&self) -> Option<String> {
        Some("fake-token".to_string())
    }
}

/// Provider fake handing out one shared [`FakeVcsClient`].
pub struct FakeVcsProvider {
    pub client: Arc<FakeVcsClient>,
    pub user_installations: Vec<i64>,
}

impl FakeVcsProvider {
    pub fn new(client: Arc<FakeVcsClient>) -> Self {
        Self {
            client,
            user_installations: Vec::new(),
        }
    }

    pub fn with_user_installations(mut self, ids: &[i64]) -> Self {
        self.user_installations = ids.to_vec();
        self
    }
}

#[async_trait]
impl VcsClientProvider for FakeVcsProvider {
    async fn client_for(
        &self,
        _installation_id: i64,
        _repo_full_name: &str,
    ) -> Result<Arc<dyn VcsClient>> {
        Ok(self.client.clone())
    }

    async fn list_user_installations(&self, _access_token: &str) -> Result<Vec<i64>> {
        Ok(self.user_installations.clone())
    }
}

/// Cloner fake that materializes a fixed file tree.
#[derive(Debug, Default)]
pub struct FixtureCloner {
    files: HashMap<String, String>,
    fail_with: Option<String>,
}

impl FixtureCloner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, relative: &str, content: &str) -> Self {
        self.files.insert(relative.to_string(), content.to_string());
        self
    }

    /// Make every clone attempt fail, simulating an unreachable remote.
    pub fn failing(message: &str) -> Self {
        Self {
            files: HashMap::new(),
            fail_with: Some(message.to_string()),
        }
    }
}

/// CI backend fake that records triggered batch ids.
#[derive(Debug, Default)]
pub struct RecordingCiBackend {
    pub triggered: Mutex<Vec<String>>,
}

impl RecordingCiBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CiBackend for RecordingCiBackend {
    async fn trigger(&self, batch_id: &str) -> Result<()> {
        self.triggered.lock().unwrap().push(batch_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl RepoCloner for FixtureCloner {
    async fn clone_at(
        &self,
        _clone_url: &str,
        _branch: &str,
        _token: Option<&str>,
    ) -> Result<ClonedRepo> {
        if let Some(message) = &self.fail_with {
            return Err(BurrowError::Git(message.clone()));
        }
        let dir = TempDir::new()
            .map_err(|e| BurrowError::Git(format!("failed to create workdir: {e}")))?;
        let checkout = dir.path().join("checkout");
        for (relative, content) in &self.files {
            let path = checkout.join(relative);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| BurrowError::Git(e.to_string()))?;
            }
            std::fs::write(&path, content).map_err(|e| BurrowError::Git(e.to_string()))?;
        }
        std::fs::create_dir_all(&checkout).map_err(|e| BurrowError::Git(e.to_string()))?;
        Ok(ClonedRepo::from_tempdir(dir))
    }
}
