//! SurrealDB-backed implementation of the Burrow store traits.
//!
//! One connection serves all four traits; the idempotence contracts are
//! enforced by the unique indexes defined in `migrations`, so concurrent
//! duplicate webhook deliveries race on the constraint rather than on an
//! in-process check.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use surrealdb::engine::any::Any;
use surrealdb::sql::Datetime as SurrealDatetime;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::{StateError, StateResult};
use crate::migrations;
use crate::records::*;
use crate::stores::{BatchStore, InstallationStore, LockStore, RepoStore};

/// SurrealDB-backed store bundle.
#[derive(Clone)]
pub struct SurrealStores {
    db: Surreal<Any>,
}

impl SurrealStores {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `burrow/main`, and runs `init_schema`.
    pub async fn in_memory() -> StateResult<Self> {
        Self::connect("mem://").await
    }

    /// Create from environment variables.
    ///
    /// Uses `BURROW_DB_URL` when set; otherwise falls back to local
    /// persistence under `.burrow/db`.
    pub async fn from_env() -> StateResult<Self> {
        if let Ok(url) = std::env::var("BURROW_DB_URL") {
            return Self::connect(&url).await;
        }

        let path = ".burrow/db";
        std::fs::create_dir_all(path).map_err(|e| {
            StateError::Connection(format!(
                "Failed to create database directory {}: {}",
                path, e
            ))
        })?;
        let url = format!("surrealkv://{}", path);
        info!(
            "No BURROW_DB_URL found, using local persistence: {}",
            url
        );
        Self::connect(&url).await
    }

    async fn connect(url: &str) -> StateResult<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        db.use_ns("burrow")
            .use_db("main")
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;

        info!("SurrealStores connected ({})", url);
        Ok(Self { db })
    }

    // -- private helpers -----------------------------------------------------

    async fn fetch_link(&self, installation_id: i64) -> StateResult<Option<InstallationLinkRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM installation_links WHERE installation_id = $iid")
            .bind(("iid", installation_id))
            .await?;
        let rows: Vec<InstallationLinkRecord> = res.take(0)?;
        Ok(rows.into_iter().next())
    }

    async fn fetch_batch(&self, batch_id: &str) -> StateResult<Option<BatchRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM batches WHERE batch_id = $bid")
            .bind(("bid", batch_id.to_string()))
            .await?;
        let rows: Vec<BatchRecord> = res.take(0)?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl InstallationStore for SurrealStores {
    async fn create_organization(&self, name: &str) -> StateResult<OrganizationRecord> {
        let org = OrganizationRecord::new(name);
        debug!(org_id = %org.org_id, "creating organization");
        let _created: Option<OrganizationRecord> =
            self.db.create("organizations").content(org.clone()).await?;
        Ok(org)
    }

    async fn get_organization(&self, org_id: &str) -> StateResult<Option<OrganizationRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM organizations WHERE org_id = $oid")
            .bind(("oid", org_id.to_string()))
            .await?;
        let rows: Vec<OrganizationRecord> = res.take(0)?;
        Ok(rows.into_iter().next())
    }

    async fn link_installation(
        &self,
        org_id: &str,
        installation_id: i64,
    ) -> StateResult<InstallationLinkRecord> {
        if let Some(existing) = self.fetch_link(installation_id).await? {
            if existing.active {
                debug!(installation_id, "installation already linked");
                return Ok(existing);
            }
            // Relink after uninstall: flip the stored row back to active.
            let mut res = self
                .db
                .query(
                    "UPDATE installation_links
                     SET organization_id = $oid, active = true
                     WHERE installation_id = $iid RETURN AFTER",
                )
                .bind(("oid", org_id.to_string()))
                .bind(("iid", installation_id))
                .await?;
            let rows: Vec<InstallationLinkRecord> = res.take(0)?;
            return rows.into_iter().next().ok_or(StateError::NotFound {
                entity: "installation link",
                key: installation_id.to_string(),
            });
        }

        let link = InstallationLinkRecord::new(installation_id, org_id);
        let created: Result<Option<InstallationLinkRecord>, surrealdb::Error> = self
            .db
            .create("installation_links")
            .content(link.clone())
            .await;
        match created {
            Ok(_) => Ok(link),
            // Lost the insert race to a duplicate delivery; the stored row
            // is the answer.
            Err(_) => self.fetch_link(installation_id).await?.ok_or(StateError::NotFound {
                entity: "installation link",
                key: installation_id.to_string(),
            }),
        }
    }

    async fn get_link(&self, installation_id: i64) -> StateResult<Option<InstallationLinkRecord>> {
        Ok(self
            .fetch_link(installation_id)
            .await?
            .filter(|l| l.active))
    }

    async fn deactivate_link(&self, installation_id: i64) -> StateResult<()> {
        let mut res = self
            .db
            .query(
                "UPDATE installation_links SET active = false
                 WHERE installation_id = $iid RETURN AFTER",
            )
            .bind(("iid", installation_id))
            .await?;
        let rows: Vec<InstallationLinkRecord> = res.take(0)?;
        if rows.is_empty() {
            return Err(StateError::NotFound {
                entity: "installation link",
                key: installation_id.to_string(),
            });
        }
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
        let record = InstallationRepoRecord {
            installation_id,
            app_id,
            account_login: account_login.to_string(),
            account_id,
            repo_full_name: repo_full_name.to_string(),
            active: true,
            updated_at: Utc::now(),
        };
        let created: Result<Option<InstallationRepoRecord>, surrealdb::Error> = self
            .db
            .create("installation_repos")
            .content(record.clone())
            .await;
        if created.is_ok() {
            return Ok(record);
        }

        // Row exists (removed earlier or duplicate delivery): reactivate.
        let mut res = self
            .db
            .query(
                "UPDATE installation_repos
                 SET active = true, updated_at = $now
                 WHERE installation_id = $iid AND repo_full_name = $full RETURN AFTER",
            )
            .bind(("now", SurrealDatetime::from(Utc::now())))
            .bind(("iid", installation_id))
            .bind(("full", repo_full_name.to_string()))
            .await?;
        let rows: Vec<InstallationRepoRecord> = res.take(0)?;
        rows.into_iter().next().ok_or(StateError::NotFound {
            entity: "installation repo",
            key: format!("{installation_id}:{repo_full_name}"),
        })
    }

    async fn record_repo_removed(
        &self,
        installation_id: i64,
        _app_id: i64,
        repo_full_name: &str,
    ) -> StateResult<()> {
        self.db
            .query(
                "UPDATE installation_repos
                 SET active = false, updated_at = $now
                 WHERE installation_id = $iid AND repo_full_name = $full",
            )
            .bind(("now", SurrealDatetime::from(Utc::now())))
            .bind(("iid", installation_id))
            .bind(("full", repo_full_name.to_string()))
            .await?;
        Ok(())
    }

    async fn create_app(&self, app: AppRecord) -> StateResult<AppRecord> {
        debug!(app_id = app.app_id, "storing app credentials");
        let _created: Option<AppRecord> = self.db.create("apps").content(app.clone()).await?;
        Ok(app)
    }
}

#[async_trait]
impl RepoStore for SurrealStores {
    async fn get_repo(
        &self,
        org_id: &str,
        canonical_name: &str,
    ) -> StateResult<Option<RepoRecord>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM repos
                 WHERE organization_id = $oid AND canonical_name = $name",
            )
            .bind(("oid", org_id.to_string()))
            .bind(("name", canonical_name.to_string()))
            .await?;
        let rows: Vec<RepoRecord> = res.take(0)?;
        Ok(rows.into_iter().next())
    }

    async fn create_repo(&self, repo: RepoRecord) -> StateResult<RepoRecord> {
        let created: Result<Option<RepoRecord>, surrealdb::Error> =
            self.db.create("repos").content(repo.clone()).await;
        match created {
            Ok(_) => Ok(repo),
            // The unique (organization, canonical name) index decided the
            // winner of a duplicate-delivery race.
            Err(_) => self
                .get_repo(&repo.organization_id, &repo.canonical_name)
                .await?
                .ok_or(StateError::NotFound {
                    entity: "repo",
                    key: repo.canonical_name,
                }),
        }
    }

    async fn update_repo_config(
        &self,
        org_id: &str,
        canonical_name: &str,
        config_yaml: &str,
        main_branch: bool,
    ) -> StateResult<()> {
        let mut res = self
            .db
            .query(
                "UPDATE repos
                 SET config_yaml = $yaml, main_branch_config = $main
                 WHERE organization_id = $oid AND canonical_name = $name RETURN AFTER",
            )
            .bind(("yaml", config_yaml.to_string()))
            .bind(("main", main_branch))
            .bind(("oid", org_id.to_string()))
            .bind(("name", canonical_name.to_string()))
            .await?;
        let rows: Vec<RepoRecord> = res.take(0)?;
        if rows.is_empty() {
            return Err(StateError::NotFound {
                entity: "repo",
                key: format!("{org_id}/{canonical_name}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BatchStore for SurrealStores {
    async fn create_batch_with_jobs(
        &self,
        batch: BatchRecord,
        mut jobs: Vec<JobRecord>,
    ) -> StateResult<()> {
        debug!(batch_id = %batch.batch_id, jobs = jobs.len(), "creating batch");
        for (i, job) in jobs.iter_mut().enumerate() {
            job.seq = i as i64;
        }
        // Single transaction: a crash mid-creation never leaves a batch
        // with a partial job set.
        self.db
            .query(
                "BEGIN TRANSACTION;
                 INSERT INTO batches $batch;
                 INSERT INTO jobs $jobs;
                 COMMIT TRANSACTION;",
            )
            .bind(("batch", batch))
            .bind(("jobs", jobs))
            .await?
            .check()
            .map_err(|e| StateError::Query(e.to_string()))?;
        Ok(())
    }

    async fn get_batch(&self, batch_id: &str) -> StateResult<Option<BatchRecord>> {
        self.fetch_batch(batch_id).await
    }

    async fn get_jobs(&self, batch_id: &str) -> StateResult<Vec<JobRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM jobs WHERE batch_id = $bid ORDER BY seq")
            .bind(("bid", batch_id.to_string()))
            .await?;
        let rows: Vec<JobRecord> = res.take(0)?;
        Ok(rows)
    }

    async fn update_batch_status(&self, batch_id: &str, status: BatchStatus) -> StateResult<()> {
        let mut res = self
            .db
            .query("UPDATE batches SET status = $status WHERE batch_id = $bid RETURN AFTER")
            .bind(("status", status))
            .bind(("bid", batch_id.to_string()))
            .await?;
        let rows: Vec<BatchRecord> = res.take(0)?;
        if rows.is_empty() {
            return Err(StateError::NotFound {
                entity: "batch",
                key: batch_id.to_string(),
            });
        }
        Ok(())
    }

    async fn set_batch_comment_id(&self, batch_id: &str, comment_id: i64) -> StateResult<i64> {
        // First write wins so re-entry keeps updating the same artifact.
        self.db
            .query(
                "UPDATE batches SET comment_id = $cid
                 WHERE batch_id = $bid AND comment_id IS NONE",
            )
            .bind(("cid", comment_id))
            .bind(("bid", batch_id.to_string()))
            .await?;
        let batch = self.fetch_batch(batch_id).await?.ok_or(StateError::NotFound {
            entity: "batch",
            key: batch_id.to_string(),
        })?;
        Ok(batch.comment_id.unwrap_or(comment_id))
    }

    async fn set_batch_source_details(
        &self,
        batch_id: &str,
        details: serde_json::Value,
    ) -> StateResult<()> {
        let mut res = self
            .db
            .query("UPDATE batches SET source_details = $details WHERE batch_id = $bid RETURN AFTER")
            .bind(("details", details))
            .bind(("bid", batch_id.to_string()))
            .await?;
        let rows: Vec<BatchRecord> = res.take(0)?;
        if rows.is_empty() {
            return Err(StateError::NotFound {
                entity: "batch",
                key: batch_id.to_string(),
            });
        }
        Ok(())
    }

    async fn update_job_status(&self, job_id: &str, status: JobStatus) -> StateResult<()> {
        let mut res = self
            .db
            .query(
                "UPDATE jobs SET status = $status, updated_at = $now
                 WHERE job_id = $jid RETURN AFTER",
            )
            .bind(("status", status))
            .bind(("now", SurrealDatetime::from(Utc::now())))
            .bind(("jid", job_id.to_string()))
            .await?;
        let rows: Vec<JobRecord> = res.take(0)?;
        if rows.is_empty() {
            return Err(StateError::NotFound {
                entity: "job",
                key: job_id.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl LockStore for SurrealStores {
    async fn try_acquire(
        &self,
        org_id: &str,
        namespace: &str,
        holder: &str,
        lease: Duration,
    ) -> StateResult<bool> {
        let now = Utc::now();
        let record = LockRecord {
            organization_id: org_id.to_string(),
            namespace: namespace.to_string(),
            holder: holder.to_string(),
            acquired_at: now,
            lease_until: now + lease,
        };

        let created: Result<Option<LockRecord>, surrealdb::Error> =
            self.db.create("locks").content(record).await;
        if created.is_ok() {
            return Ok(true);
        }

        // Row exists: take it over only when we already hold it (lease
        // extension) or the lease has expired (crashed holder).
        let mut res = self
            .db
            .query(
                "UPDATE locks
                 SET holder = $holder, acquired_at = $now, lease_until = $until
                 WHERE organization_id = $oid AND namespace = $ns
                   AND (holder = $holder OR lease_until <= $now)
                 RETURN AFTER",
            )
            .bind(("holder", holder.to_string()))
            .bind(("now", SurrealDatetime::from(now)))
            .bind(("until", SurrealDatetime::from(now + lease)))
            .bind(("oid", org_id.to_string()))
            .bind(("ns", namespace.to_string()))
            .await?;
        let rows: Vec<LockRecord> = res.take(0)?;
        Ok(rows.iter().any(|l| l.holder == holder))
    }

    async fn release(&self, org_id: &str, namespace: &str, holder: &str) -> StateResult<()> {
        self.db
            .query(
                "DELETE FROM locks
                 WHERE organization_id = $oid AND namespace = $ns AND holder = $holder",
            )
            .bind(("oid", org_id.to_string()))
            .bind(("ns", namespace.to_string()))
            .bind(("holder", holder.to_string()))
            .await?;
        Ok(())
    }

    async fn get(&self, org_id: &str, namespace: &str) -> StateResult<Option<LockRecord>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM locks
                 WHERE organization_id = $oid AND namespace = $ns",
            )
            .bind(("oid", org_id.to_string()))
            .bind(("ns", namespace.to_string()))
            .await?;
        let rows: Vec<LockRecord> = res.take(0)?;
        Ok(rows.into_iter().next())
    }
}
