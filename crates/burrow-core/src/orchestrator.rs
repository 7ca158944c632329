//! Event orchestration: decoded webhook events in, stored state and
//! provider side effects out.
//!
//! Every collaborator is an injected trait object, so the whole pipeline
//! runs against the in-memory fakes in tests. Handlers are written for
//! at-least-once delivery: each one either reaches the same state on
//! redelivery or fails without partial writes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use burrow_state::{
    canonical_repo_name, lock_namespace, BatchRecord, BatchStore, InstallationLinkRecord,
    InstallationStore, JobRecord, LockStore, OrganizationRecord, RepoRecord, RepoStore,
};

use crate::config::{CommentRenderMode, DEFAULT_GENERATED_CONFIG};
use crate::error::{BurrowError, Result};
use crate::events::{Installation, PullRequestEvent, PushEvent, RepoDescriptor, WebhookEvent};
use crate::impact::resolve_impact;
use crate::loader::{load_repo_config, LoadedConfig};
use crate::locks::LockManager;
use crate::planner::{batch_type, plan_jobs, TriggerCommand, TriggerContext};
use crate::reporter::CommentReporter;
use crate::vcs::{StatusState, VcsClient, VcsClientProvider};
use crate::workdir::RepoCloner;

/// Hands a created batch to whatever runs its jobs.
#[async_trait]
pub trait CiBackend: Send + Sync {
    async fn trigger(&self, batch_id: &str) -> Result<()>;
}

/// What an event resolved to; the webhook endpoint logs this and returns 200.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Event type or action we take no action on.
    Ignored,
    /// Installation bookkeeping applied for `repos` repositories.
    InstallationSynced { repos: usize },
    /// Installation link deactivated.
    InstallationDeactivated,
    /// Stored config replaced from a push.
    ConfigRefreshed { main_branch: bool },
    /// No project watched any changed file; no batch created.
    NoImpact,
    /// Draft change request and drafts are not allowed.
    DraftSkipped,
    /// A lock or unlock command was applied directly, without a batch.
    LocksToggled { namespaces: Vec<String> },
    /// A batch and its jobs were persisted and handed to the CI backend.
    BatchCreated { batch_id: String, job_count: usize },
}

/// The event-driven pipeline over injected stores and collaborators.
pub struct Orchestrator {
    installations: Arc<dyn InstallationStore>,
    repos: Arc<dyn RepoStore>,
    batches: Arc<dyn BatchStore>,
    provider: Arc<dyn VcsClientProvider>,
    cloner: Arc<dyn RepoCloner>,
    ci: Arc<dyn CiBackend>,
    locks: LockManager,
    reporter: CommentReporter,
}

impl Orchestrator {
    pub fn new(
        installations: Arc<dyn InstallationStore>,
        repos: Arc<dyn RepoStore>,
        batches: Arc<dyn BatchStore>,
        lock_store: Arc<dyn LockStore>,
        provider: Arc<dyn VcsClientProvider>,
        cloner: Arc<dyn RepoCloner>,
        ci: Arc<dyn CiBackend>,
    ) -> Self {
        let reporter = CommentReporter::new(batches.clone());
        Self {
            installations,
            repos,
            batches,
            provider,
            cloner,
            ci,
            locks: LockManager::new(lock_store),
            reporter,
        }
    }

    /// Dispatch one decoded webhook event.
    pub async fn handle_event(&self, event: WebhookEvent) -> Result<PipelineOutcome> {
        match event {
            WebhookEvent::InstallationCreated {
                installation,
                repositories,
            }
            | WebhookEvent::InstallationReposAdded {
                installation,
                repositories,
            } => self.handle_repos_added(&installation, &repositories).await,
            WebhookEvent::InstallationDeleted {
                installation,
                repositories,
            } => self.handle_installation_deleted(&installation, &repositories).await,
            WebhookEvent::InstallationReposRemoved {
                installation,
                repositories,
            } => {
                for repo in &repositories {
                    self.installations
                        .record_repo_removed(installation.id, installation.app_id, &repo.full_name)
                        .await?;
                }
                Ok(PipelineOutcome::InstallationSynced {
                    repos: repositories.len(),
                })
            }
            WebhookEvent::PullRequest(pr) => match pr.action.as_str() {
                "opened" | "reopened" | "synchronize" | "ready_for_review" => {
                    self.run_change_pipeline(&pr, TriggerCommand::Plan).await
                }
                _ => Ok(PipelineOutcome::Ignored),
            },
            WebhookEvent::Push(push) => self.handle_push(&push).await,
            WebhookEvent::Ignored { event_type } => {
                info!(event_type, "ignoring event");
                Ok(PipelineOutcome::Ignored)
            }
        }
    }

    /// Run a comment-issued command against an open change request.
    pub async fn handle_command(
        &self,
        pr: &PullRequestEvent,
        comment: &str,
    ) -> Result<PipelineOutcome> {
        let command = TriggerCommand::parse(comment)?;
        self.run_change_pipeline(pr, command).await
    }

    /// Attach a validated installation to its organization. Idempotent:
    /// redelivery returns the existing active link.
    pub async fn link_installation(
        &self,
        org_id: &str,
        installation_id: i64,
    ) -> Result<InstallationLinkRecord> {
        let link = self
            .installations
            .link_installation(org_id, installation_id)
            .await?;
        info!(installation_id, org_id, "installation linked");
        Ok(link)
    }

    async fn handle_repos_added(
        &self,
        installation: &Installation,
        repositories: &[RepoDescriptor],
    ) -> Result<PipelineOutcome> {
        for repo in repositories {
            self.installations
                .record_repo_added(
                    installation.id,
                    installation.app_id,
                    &installation.account_login,
                    installation.account_id,
                    &repo.full_name,
                )
                .await?;
            self.ensure_repo_record(installation.id, repo).await?;
        }
        info!(
            installation_id = installation.id,
            repos = repositories.len(),
            "installation repositories recorded"
        );
        Ok(PipelineOutcome::InstallationSynced {
            repos: repositories.len(),
        })
    }

    async fn handle_installation_deleted(
        &self,
        installation: &Installation,
        repositories: &[RepoDescriptor],
    ) -> Result<PipelineOutcome> {
        self.installations.deactivate_link(installation.id).await?;
        for repo in repositories {
            self.installations
                .record_repo_removed(installation.id, installation.app_id, &repo.full_name)
                .await?;
        }
        info!(installation_id = installation.id, "installation deactivated");
        Ok(PipelineOutcome::InstallationDeactivated)
    }

    /// Create the repo record under the installation's organization if it
    /// does not exist yet. New records start with the default generated
    /// config; the first push or change event replaces it.
    async fn ensure_repo_record(
        &self,
        installation_id: i64,
        repo: &RepoDescriptor,
    ) -> Result<RepoRecord> {
        let org = self.resolve_organization(installation_id).await?;
        let record = RepoRecord {
            organization_id: org.org_id.clone(),
            canonical_name: canonical_repo_name(&repo.full_name),
            full_name: repo.full_name.clone(),
            owner_login: repo.owner().to_string(),
            name: repo.name.clone(),
            clone_url: repo.clone_url.clone(),
            config_yaml: DEFAULT_GENERATED_CONFIG.to_string(),
            main_branch_config: false,
            created_at: Utc::now(),
        };
        Ok(self.repos.create_repo(record).await?)
    }

    async fn resolve_organization(&self, installation_id: i64) -> Result<OrganizationRecord> {
        let link = self
            .installations
            .get_link(installation_id)
            .await?
            .ok_or(BurrowError::UnknownInstallation(installation_id))?;
        self.installations
            .get_organization(&link.organization_id)
            .await?
            .ok_or_else(|| BurrowError::OrganizationNotFound(link.organization_id.clone()))
    }

    /// Reload the stored config from the pushed branch.
    async fn handle_push(&self, push: &PushEvent) -> Result<PipelineOutcome> {
        let org = self.resolve_organization(push.installation_id).await?;
        let canonical = canonical_repo_name(&push.repository.full_name);
        let repo = self
            .repos
            .get_repo(&org.org_id, &canonical)
            .await?
            .ok_or_else(|| BurrowError::RepoNotFound {
                org_id: org.org_id.clone(),
                canonical_name: canonical.clone(),
            })?;

        let client = self
            .provider
            .client_for(push.installation_id, &push.repository.full_name)
            .await?;
        let token = client.installation_token();
        let loaded = load_repo_config(
            self.cloner.as_ref(),
            &repo.clone_url,
            push.branch(),
            token.as_deref(),
        )
        .await?;

        let main_branch = push.is_default_branch();
        self.repos
            .update_repo_config(&org.org_id, &canonical, &loaded.raw_yaml, main_branch)
            .await?;
        info!(repo = %push.repository.full_name, main_branch, "stored config refreshed");
        Ok(PipelineOutcome::ConfigRefreshed { main_branch })
    }

    /// The end-to-end change pipeline: identity, config, impact, planning,
    /// reporting, batch creation, CI handoff.
    async fn run_change_pipeline(
        &self,
        pr: &PullRequestEvent,
        command: TriggerCommand,
    ) -> Result<PipelineOutcome> {
        let org = self.resolve_organization(pr.installation_id).await?;
        let client = self
            .provider
            .client_for(pr.installation_id, &pr.repository.full_name)
            .await?;

        let branch_info = client.get_branch_info(pr.number).await?;
        let changed_files = client.get_changed_files(pr.number).await?;

        let loaded = self
            .load_config_reporting_failure(client.as_ref(), pr, &branch_info.branch)
            .await?;

        let impact = resolve_impact(&loaded.config, &loaded.graph, &changed_files);
        if impact.is_empty() {
            // Nothing watched those paths. Settle the status so the change
            // request is not left pending, and stop without a batch.
            if let Err(e) = client
                .set_commit_status(&branch_info.head_sha, StatusState::Success, "no impacted projects")
                .await
            {
                warn!(pr = pr.number, error = %e, "status update failed");
            }
            info!(pr = pr.number, "no impacted projects, skipping");
            return Ok(PipelineOutcome::NoImpact);
        }

        let ctx = TriggerContext {
            command,
            branch: branch_info.branch.clone(),
            commit_sha: branch_info.head_sha.clone(),
            pr_number: pr.number,
            draft: pr.draft,
        };

        if command.is_lock_action() {
            return self
                .toggle_locks(client.as_ref(), &org, pr, command, &impact.projects)
                .await;
        }

        let jobs = plan_jobs(&ctx, &impact, &loaded.config);
        if jobs.is_empty() {
            info!(pr = pr.number, "draft change request, skipping");
            return Ok(PipelineOutcome::DraftSkipped);
        }

        let batch = BatchRecord::new(
            batch_type(&jobs),
            org.org_id.clone(),
            pr.installation_id,
            pr.repository.full_name.clone(),
            pr.repository.owner_login.clone(),
            pr.repository.name.clone(),
            ctx.branch.clone(),
            ctx.commit_sha.clone(),
            pr.number,
        );
        let job_records: Vec<JobRecord> = jobs
            .iter()
            .map(|j| JobRecord::new(&batch.batch_id, &j.project_name, j.commands.clone()))
            .collect();

        self.batches
            .create_batch_with_jobs(batch.clone(), job_records.clone())
            .await?;
        info!(batch_id = %batch.batch_id, jobs = job_records.len(), "batch created");

        self.reporter
            .publish_progress(client.as_ref(), &batch, &job_records)
            .await?;
        self.reporter
            .publish_commit_status(client.as_ref(), &batch)
            .await;
        if loaded.config.comment_render_mode == CommentRenderMode::GroupByModule {
            self.reporter
                .publish_source_groupings(client.as_ref(), &batch, &impact)
                .await?;
        }

        self.ci.trigger(&batch.batch_id).await?;
        Ok(PipelineOutcome::BatchCreated {
            batch_id: batch.batch_id,
            job_count: job_records.len(),
        })
    }

    /// Load the repository config, surfacing a failure to the change
    /// request as a single comment before propagating it.
    async fn load_config_reporting_failure(
        &self,
        client: &dyn VcsClient,
        pr: &PullRequestEvent,
        branch: &str,
    ) -> Result<LoadedConfig> {
        let token = client.installation_token();
        match load_repo_config(
            self.cloner.as_ref(),
            &pr.repository.clone_url,
            branch,
            token.as_deref(),
        )
        .await
        {
            Ok(loaded) => Ok(loaded),
            Err(e) => {
                let body = format!(":x: Could not load project configuration: {e}");
                if let Err(post_err) = client.post_comment(pr.number, &body).await {
                    warn!(pr = pr.number, error = %post_err, "config failure comment failed");
                }
                Err(e)
            }
        }
    }

    /// Apply a lock or unlock command to every impacted project, without
    /// creating jobs or a batch. The change request itself is the holder.
    async fn toggle_locks(
        &self,
        client: &dyn VcsClient,
        org: &OrganizationRecord,
        pr: &PullRequestEvent,
        command: TriggerCommand,
        projects: &[String],
    ) -> Result<PipelineOutcome> {
        let holder = format!("pr-{}", pr.number);
        let mut namespaces = Vec::with_capacity(projects.len());
        for project in projects {
            let namespace = lock_namespace(&pr.repository.full_name, project);
            match command {
                TriggerCommand::Lock => self.locks.acquire(&org.org_id, &namespace, &holder).await?,
                TriggerCommand::Unlock => self.locks.release(&org.org_id, &namespace, &holder).await?,
                _ => unreachable!("not a lock action"),
            }
            namespaces.push(namespace);
        }

        let verb = match command {
            TriggerCommand::Lock => "Locked",
            _ => "Unlocked",
        };
        let body = format!("{verb} projects: {}", projects.join(", "));
        if let Err(e) = client.post_comment(pr.number, &body).await {
            warn!(pr = pr.number, error = %e, "lock confirmation comment failed");
        }
        Ok(PipelineOutcome::LocksToggled { namespaces })
    }
}
