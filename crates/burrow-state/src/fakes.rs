//! In-memory fakes for the store traits (testing only)
//!
//! Provides `MemoryInstallationStore`, `MemoryRepoStore`, `MemoryBatchStore`
//! and `MemoryLockStore` that satisfy the trait contracts without any
//! external dependencies. The locked-map granularity matches the uniqueness
//! constraints the SurrealDB backend enforces with indexes, so the fakes
//! exhibit the same idempotence behavior under duplicate deliveries.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::error::{StateError, StateResult};
use crate::records::*;
use crate::stores::{BatchStore, InstallationStore, LockStore, RepoStore};

// ---------------------------------------------------------------------------
// MemoryInstallationStore
// ---------------------------------------------------------------------------

/// In-memory installation store.
#[derive(Debug, Default)]
pub struct MemoryInstallationStore {
    orgs: Mutex<HashMap<String, OrganizationRecord>>,
    links: Mutex<HashMap<i64, InstallationLinkRecord>>,
    installation_repos: Mutex<Vec<InstallationRepoRecord>>,
    apps: Mutex<HashMap<i64, AppRecord>>,
}

impl MemoryInstallationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InstallationStore for MemoryInstallationStore {
    async fn create_organization(&self, name: &str) -> StateResult<OrganizationRecord> {
        let org = OrganizationRecord::new(name);
        let mut orgs = self.orgs.lock().unwrap();
        orgs.insert(org.org_id.clone(), org.clone());
        Ok(org)
    }

    async fn get_organization(&self, org_id: &str) -> StateResult<Option<OrganizationRecord>> {
        let orgs = self.orgs.lock().unwrap();
        Ok(orgs.get(org_id).cloned())
    }

    async fn link_installation(
        &self,
        org_id: &str,
        installation_id: i64,
    ) -> StateResult<InstallationLinkRecord> {
        let mut links = self.links.lock().unwrap();
        if let Some(existing) = links.get(&installation_id) {
            if existing.active {
                return Ok(existing.clone());
            }
        }
        let link = InstallationLinkRecord::new(installation_id, org_id);
        links.insert(installation_id, link.clone());
        Ok(link)
    }

    async fn get_link(&self, installation_id: i64) -> StateResult<Option<InstallationLinkRecord>> {
        let links = self.links.lock().unwrap();
        Ok(links.get(&installation_id).filter(|l| l.active).cloned())
    }

    async fn deactivate_link(&self, installation_id: i64) -> StateResult<()> {
        let mut links = self.links.lock().unwrap();
        let link = links
            .get_mut(&installation_id)
            .ok_or_else(|| StateError::NotFound {
                entity: "installation link",
                key: installation_id.to_string(),
            })?;
        link.active = false;
        Ok(())
    }

    async fn record_repo_added(
        &self,
        installation_id: i64,
        app_id: i64,
        account_login: &str,
        account_id: i64,
        repo_full_name: &str,
    ) -> StateResult<InstallationRepoRecord> {
        let mut repos = self.installation_repos.lock().unwrap();
        if let Some(existing) = repos
            .iter_mut()
            .find(|r| r.installation_id == installation_id && r.repo_full_name == repo_full_name)
        {
            existing.active = true;
            existing.updated_at = Utc::now();
            return Ok(existing.clone());
        }
        let record = InstallationRepoRecord {
            installation_id,
            app_id,
            account_login: account_login.to_string(),
            account_id,
            repo_full_name: repo_full_name.to_string(),
            active: true,
            updated_at: Utc::now(),
        };
        repos.push(record.clone());
        Ok(record)
    }

    async fn record_repo_removed(
        &self,
        installation_id: i64,
        _app_id: i64,
        repo_full_name: &str,
    ) -> StateResult<()> {
        let mut repos = self.installation_repos.lock().unwrap();
        if let Some(existing) = repos
            .iter_mut()
            .find(|r| r.installation_id == installation_id && r.repo_full_name == repo_full_name)
        {
            existing.active = false;
            existing.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn create_app(&self, app: AppRecord) -> StateResult<AppRecord> {
        let mut apps = self.apps.lock().unwrap();
        apps.insert(app.app_id, app.clone());
        Ok(app)
    }
}

// ---------------------------------------------------------------------------
// MemoryRepoStore
// ---------------------------------------------------------------------------

/// In-memory repo store keyed by (organization, canonical name).
#[derive(Debug, Default)]
pub struct MemoryRepoStore {
    repos: Mutex<HashMap<(String, String), RepoRecord>>,
}

impl MemoryRepoStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RepoStore for MemoryRepoStore {
    async fn get_repo(
        &self,
        org_id: &str,
        canonical_name: &str,
    ) -> StateResult<Option<RepoRecord>> {
        let repos = self.repos.lock().unwrap();
        Ok(repos
            .get(&(org_id.to_string(), canonical_name.to_string()))
            .cloned())
    }

    async fn create_repo(&self, repo: RepoRecord) -> StateResult<RepoRecord> {
        let key = (repo.organization_id.clone(), repo.canonical_name.clone());
        let mut repos = self.repos.lock().unwrap();
        // Lost race on a duplicate delivery resolves to the stored record.
        if let Some(existing) = repos.get(&key) {
            return Ok(existing.clone());
        }
        repos.insert(key, repo.clone());
        Ok(repo)
    }

    async fn update_repo_config(
        &self,
        org_id: &str,
        canonical_name: &str,
        config_yaml: &str,
        main_branch: bool,
    ) -> StateResult<()> {
        let mut repos = self.repos.lock().unwrap();
        let repo = repos
            .get_mut(&(org_id.to_string(), canonical_name.to_string()))
            .ok_or_else(|| StateError::NotFound {
                entity: "repo",
                key: format!("{org_id}/{canonical_name}"),
            })?;
        repo.config_yaml = config_yaml.to_string();
        repo.main_branch_config = main_branch;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryBatchStore
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct BatchState {
    batch: BatchRecord,
    job_ids: Vec<String>,
}

/// In-memory batch store.
#[derive(Debug, Default)]
pub struct MemoryBatchStore {
    batches: Mutex<HashMap<String, BatchState>>,
    jobs: Mutex<HashMap<String, JobRecord>>,
}

impl MemoryBatchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BatchStore for MemoryBatchStore {
    async fn create_batch_with_jobs(
        &self,
        batch: BatchRecord,
        mut jobs: Vec<JobRecord>,
    ) -> StateResult<()> {
        // Both maps are filled under the batches guard so a reader never
        // observes a batch with a partial job set.
        let mut batches = self.batches.lock().unwrap();
        if batches.contains_key(&batch.batch_id) {
            return Err(StateError::AlreadyExists {
                entity: "batch",
                key: batch.batch_id.clone(),
            });
        }
        let mut job_map = self.jobs.lock().unwrap();
        for (i, job) in jobs.iter_mut().enumerate() {
            job.seq = i as i64;
        }
        let job_ids = jobs.iter().map(|j| j.job_id.clone()).collect();
        for job in jobs {
            job_map.insert(job.job_id.clone(), job);
        }
        batches.insert(batch.batch_id.clone(), BatchState { batch, job_ids });
        Ok(())
    }

    async fn get_batch(&self, batch_id: &str) -> StateResult<Option<BatchRecord>> {
        let batches = self.batches.lock().unwrap();
        Ok(batches.get(batch_id).map(|s| s.batch.clone()))
    }

    async fn get_jobs(&self, batch_id: &str) -> StateResult<Vec<JobRecord>> {
        let batches = self.batches.lock().unwrap();
        let state = batches.get(batch_id).ok_or_else(|| StateError::NotFound {
            entity: "batch",
            key: batch_id.to_string(),
        })?;
        let jobs = self.jobs.lock().unwrap();
        Ok(state
            .job_ids
            .iter()
            .filter_map(|id| jobs.get(id).cloned())
            .collect())
    }

    async fn update_batch_status(&self, batch_id: &str, status: BatchStatus) -> StateResult<()> {
        let mut batches = self.batches.lock().unwrap();
        let state = batches
            .get_mut(batch_id)
            .ok_or_else(|| StateError::NotFound {
                entity: "batch",
                key: batch_id.to_string(),
            })?;
        state.batch.status = status;
        Ok(())
    }

    async fn set_batch_comment_id(&self, batch_id: &str, comment_id: i64) -> StateResult<i64> {
        let mut batches = self.batches.lock().unwrap();
        let state = batches
            .get_mut(batch_id)
            .ok_or_else(|| StateError::NotFound {
                entity: "batch",
                key: batch_id.to_string(),
            })?;
        if let Some(existing) = state.batch.comment_id {
            return Ok(existing);
        }
        state.batch.comment_id = Some(comment_id);
        Ok(comment_id)
    }

    async fn set_batch_source_details(
        &self,
        batch_id: &str,
        details: serde_json::Value,
    ) -> StateResult<()> {
        let mut batches = self.batches.lock().unwrap();
        let state = batches
            .get_mut(batch_id)
            .ok_or_else(|| StateError::NotFound {
                entity: "batch",
                key: batch_id.to_string(),
            })?;
        state.batch.source_details = Some(details);
        Ok(())
    }

    async fn update_job_status(&self, job_id: &str, status: JobStatus) -> StateResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(job_id).ok_or_else(|| StateError::NotFound {
            entity: "job",
            key: job_id.to_string(),
        })?;
        job.status = status;
        job.updated_at = Utc::now();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryLockStore
// ---------------------------------------------------------------------------

/// In-memory lock store keyed by (organization, namespace).
#[derive(Debug, Default)]
pub struct MemoryLockStore {
    locks: Mutex<HashMap<(String, String), LockRecord>>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn try_acquire(
        &self,
        org_id: &str,
        namespace: &str,
        holder: &str,
        lease: Duration,
    ) -> StateResult<bool> {
        let now = Utc::now();
        let key = (org_id.to_string(), namespace.to_string());
        let mut locks = self.locks.lock().unwrap();
        if let Some(existing) = locks.get(&key) {
            if existing.holder != holder && !existing.expired(now) {
                return Ok(false);
            }
        }
        locks.insert(
            key,
            LockRecord {
                organization_id: org_id.to_string(),
                namespace: namespace.to_string(),
                holder: holder.to_string(),
                acquired_at: now,
                lease_until: now + lease,
            },
        );
        Ok(true)
    }

    async fn release(&self, org_id: &str, namespace: &str, holder: &str) -> StateResult<()> {
        let key = (org_id.to_string(), namespace.to_string());
        let mut locks = self.locks.lock().unwrap();
        if locks.get(&key).is_some_and(|l| l.holder == holder) {
            locks.remove(&key);
        }
        Ok(())
    }

    async fn get(&self, org_id: &str, namespace: &str) -> StateResult<Option<LockRecord>> {
        let locks = self.locks.lock().unwrap();
        Ok(locks
            .get(&(org_id.to_string(), namespace.to_string()))
            .cloned())
    }
}
