//! Record definitions for the Burrow persistence tables.
//!
//! Tables:
//! - organizations: tenant roots; every other record is scoped under one
//! - installation_links: VCS app installation -> organization mapping
//! - installation_repos: per-installation repository bookkeeping
//! - apps: GitHub App credentials from the manifest exchange
//! - repos: linked repositories with their stored project config
//! - batches / jobs: scheduled plan/apply work
//! - locks: per-project mutual exclusion claims

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::sql::Thing;
use uuid::Uuid;

/// Module for serializing chrono DateTime to SurrealDB datetime format
pub(crate) mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Derive the internal repository name from a VCS full name.
///
/// This is the join key between the VCS identity (`acme/infra`) and the
/// internal identity (`acme-infra`): every slash is replaced by a dash.
///
/// The mapping is deliberately simple but lossy: `a/b-c` and `a-b/c` both
/// normalize to `a-b-c`. The unique (organization, canonical name) index on
/// the repos table means the second such repo resolves to the first rather
/// than erroring. Known collision risk, accepted for now.
pub fn canonical_repo_name(full_name: &str) -> String {
    full_name.replace('/', "-")
}

/// Lock namespace for a project: repo full name and project name.
pub fn lock_namespace(repo_full_name: &str, project_name: &str) -> String {
    format!("{repo_full_name}#{project_name}")
}

/// A tenant organization. Root of the ownership hierarchy.
///
/// `id` is the SurrealDB record id, assigned by the database on insert;
/// `org_id` is the application key every other table references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Thing>,
    pub org_id: String,
    pub name: String,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl OrganizationRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            org_id: Uuid::new_v4().to_string(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// Mapping between a VCS app installation and the organization that owns it.
///
/// Invariant: at most one active link per installation id. Deactivated on
/// uninstall, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallationLinkRecord {
    pub installation_id: i64,
    pub organization_id: String,
    pub active: bool,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl InstallationLinkRecord {
    pub fn new(installation_id: i64, organization_id: impl Into<String>) -> Self {
        Self {
            installation_id,
            organization_id: organization_id.into(),
            active: true,
            created_at: Utc::now(),
        }
    }
}

/// Per-installation repository bookkeeping, fed by installation webhooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallationRepoRecord {
    pub installation_id: i64,
    pub app_id: i64,
    pub account_login: String,
    pub account_id: i64,
    pub repo_full_name: String,
    pub active: bool,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

/// GitHub App credentials persisted by the manifest exchange flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppRecord {
    pub app_id: i64,
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
    pub private_key: String,
    pub webhook_secret: String,
    pub html_url: String,
}

/// A linked repository and its stored project configuration.
///
/// `config_yaml` holds the raw config text verbatim for audit/replay;
/// `main_branch_config` marks whether it came from the default branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoRecord {
    pub organization_id: String,
    pub canonical_name: String,
    pub full_name: String,
    pub owner_login: String,
    pub name: String,
    pub clone_url: String,
    pub config_yaml: String,
    pub main_branch_config: bool,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

/// Which VCS provider a batch originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VcsKind {
    Github,
}

/// Aggregate classification of a batch: Apply only when every job carries
/// an apply command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchType {
    Plan,
    Apply,
    Unknown,
}

/// Batch lifecycle: Created -> Running -> terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Created,
    Running,
    Succeeded,
    Failed,
    PartiallySucceeded,
}

impl BatchStatus {
    /// True once the batch has reached a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BatchStatus::Succeeded | BatchStatus::Failed | BatchStatus::PartiallySucceeded
        )
    }
}

/// Job lifecycle within a batch: Queued -> Locked -> Running -> terminal.
/// A job that cannot take its project lock lands in Blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Blocked,
    Locked,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// True once the job has reached a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// The unit grouping all jobs produced by resolving one triggering event.
///
/// The type is immutable after creation; status and the reporting fields
/// (`comment_id`, `source_details`) are the only mutable parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Thing>,
    pub batch_id: String,
    pub batch_type: BatchType,
    pub organization_id: String,
    pub installation_id: i64,
    pub vcs: VcsKind,
    pub repo_full_name: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub branch: String,
    pub commit_sha: String,
    pub pr_number: i64,
    /// Identifier of the single progress comment, set once.
    pub comment_id: Option<i64>,
    /// Grouped-comment identifiers when group-by-module reporting is on.
    pub source_details: Option<serde_json::Value>,
    pub status: BatchStatus,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

#[allow(clippy::too_many_arguments)]
impl BatchRecord {
    pub fn new(
        batch_type: BatchType,
        organization_id: impl Into<String>,
        installation_id: i64,
        repo_full_name: impl Into<String>,
        repo_owner: impl Into<String>,
        repo_name: impl Into<String>,
        branch: impl Into<String>,
        commit_sha: impl Into<String>,
        pr_number: i64,
    ) -> Self {
        Self {
            id: None,
            batch_id: Uuid::new_v4().to_string(),
            batch_type,
            organization_id: organization_id.into(),
            installation_id,
            vcs: VcsKind::Github,
            repo_full_name: repo_full_name.into(),
            repo_owner: repo_owner.into(),
            repo_name: repo_name.into(),
            branch: branch.into(),
            commit_sha: commit_sha.into(),
            pr_number,
            comment_id: None,
            source_details: None,
            status: BatchStatus::Created,
            created_at: Utc::now(),
        }
    }
}

/// One project's command execution descriptor within a batch.
///
/// `seq` is the job's position within its batch, assigned at batch
/// creation; `get_jobs` returns jobs ordered by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Thing>,
    pub job_id: String,
    pub batch_id: String,
    pub seq: i64,
    pub project_name: String,
    pub commands: Vec<String>,
    pub status: JobStatus,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(
        batch_id: impl Into<String>,
        project_name: impl Into<String>,
        commands: Vec<String>,
    ) -> Self {
        Self {
            id: None,
            job_id: Uuid::new_v4().to_string(),
            batch_id: batch_id.into(),
            seq: 0,
            project_name: project_name.into(),
            commands,
            status: JobStatus::Queued,
            updated_at: Utc::now(),
        }
    }
}

/// An exclusive claim on (organization, project namespace).
///
/// Held for the duration of a project's active job. The lease bounds the
/// leak window when a worker crashes without releasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    pub organization_id: String,
    pub namespace: String,
    pub holder: String,
    #[serde(with = "surreal_datetime")]
    pub acquired_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub lease_until: DateTime<Utc>,
}

impl LockRecord {
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        self.lease_until <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_repo_name_replaces_slashes() {
        assert_eq!(canonical_repo_name("acme/infra"), "acme-infra");
        assert_eq!(canonical_repo_name("a/b/c"), "a-b-c");
    }

    #[test]
    fn test_canonical_repo_name_is_lossy() {
        // Documented collision: distinct remotes, same canonical name.
        assert_eq!(
            canonical_repo_name("a/b-c"),
            canonical_repo_name("a-b/c")
        );
    }

    #[test]
    fn test_lock_namespace_format() {
        assert_eq!(lock_namespace("acme/infra", "core"), "acme/infra#core");
    }

    #[test]
    fn test_new_batch_starts_created_without_comment() {
        let batch = BatchRecord::new(
            BatchType::Plan,
            "org-1",
            42,
            "acme/infra",
            "acme",
            "infra",
            "feature/x",
            "abc123",
            7,
        );
        assert_eq!(batch.status, BatchStatus::Created);
        assert_eq!(batch.comment_id, None);
        assert_eq!(batch.vcs, VcsKind::Github);
    }

    #[test]
    fn test_terminal_status_classification() {
        assert!(BatchStatus::PartiallySucceeded.is_terminal());
        assert!(!BatchStatus::Running.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Blocked.is_terminal());
    }

    #[test]
    fn test_lock_expiry() {
        let now = Utc::now();
        let lock = LockRecord {
            organization_id: "org-1".to_string(),
            namespace: "acme/infra#core".to_string(),
            holder: "job-1".to_string(),
            acquired_at: now - chrono::Duration::minutes(31),
            lease_until: now - chrono::Duration::minutes(1),
        };
        assert!(lock.expired(now));
        assert!(!lock.expired(now - chrono::Duration::minutes(2)));
    }
}
