//! End-to-end pipeline tests over the in-memory fakes: webhook event in,
//! stored batches, locks, comments, and statuses out.

use std::sync::Arc;

use burrow_core::events::{Installation, RepoDescriptor, Repository};
use burrow_core::fakes::{FakeVcsClient, FakeVcsProvider, FixtureCloner, RecordingCiBackend};
use burrow_core::setup::validate_callback;
use burrow_core::vcs::{StatusState, VcsClientProvider};
use burrow_core::{
    BurrowError, Orchestrator, PipelineOutcome, PullRequestEvent, PushEvent, WebhookEvent,
};
use burrow_state::{
    canonical_repo_name, lock_namespace, BatchStore, BatchType, InstallationStore, LockStore,
    MemoryBatchStore, MemoryInstallationStore, MemoryLockStore, MemoryRepoStore, RepoStore,
};

const INSTALLATION_ID: i64 = 42;
const APP_ID: i64 = 7;

struct Harness {
    orchestrator: Orchestrator,
    installations: Arc<MemoryInstallationStore>,
    repos: Arc<MemoryRepoStore>,
    batches: Arc<MemoryBatchStore>,
    locks: Arc<MemoryLockStore>,
    client: Arc<FakeVcsClient>,
    ci: Arc<RecordingCiBackend>,
    org_id: String,
}

async fn harness(client: FakeVcsClient, cloner: FixtureCloner) -> Harness {
    let installations = Arc::new(MemoryInstallationStore::new());
    let repos = Arc::new(MemoryRepoStore::new());
    let batches = Arc::new(MemoryBatchStore::new());
    let locks = Arc::new(MemoryLockStore::new());
    let client = Arc::new(client);
    let ci = Arc::new(RecordingCiBackend::new());

    let org = installations.create_organization("acme").await.unwrap();
    installations
        .link_installation(&org.org_id, INSTALLATION_ID)
        .await
        .unwrap();

    let provider = Arc::new(FakeVcsProvider::new(client.clone()));
    let orchestrator = Orchestrator::new(
        installations.clone(),
        repos.clone(),
        batches.clone(),
        locks.clone(),
        provider,
        Arc::new(cloner),
        ci.clone(),
    );
    Harness {
        orchestrator,
        installations,
        repos,
        batches,
        locks,
        client,
        ci,
        org_id: org.org_id,
    }
}

fn installation() -> Installation {
    Installation {
        id: INSTALLATION_ID,
        app_id: APP_ID,
        account_login: "acme".to_string(),
        account_id: 100,
    }
}

fn repo_descriptor() -> RepoDescriptor {
    RepoDescriptor {
        full_name: "acme/infra".to_string(),
        name: "infra".to_string(),
        clone_url: "https://github.com/acme/infra".to_string(),
    }
}

fn repository() -> Repository {
    Repository {
        full_name: "acme/infra".to_string(),
        name: "infra".to_string(),
        owner_login: "acme".to_string(),
        clone_url: "https://github.com/acme/infra".to_string(),
        default_branch: "main".to_string(),
    }
}

fn pr_event(action: &str, draft: bool) -> PullRequestEvent {
    PullRequestEvent {
        action: action.to_string(),
        installation_id: INSTALLATION_ID,
        repository: repository(),
        number: 7,
        draft,
        head_branch: "feature/x".to_string(),
        head_sha: "abc123".to_string(),
    }
}

fn layered_config_cloner() -> FixtureCloner {
    FixtureCloner::new().with_file(
        "digger.yml",
        r#"
projects:
  - name: vpc
    dir: infra/vpc
  - name: core
    dir: infra/core
    depends_on: [vpc]
"#,
    )
}

#[tokio::test]
async fn test_duplicate_installation_created_is_idempotent() {
    let h = harness(FakeVcsClient::new(), FixtureCloner::new()).await;
    let event = WebhookEvent::InstallationCreated {
        installation: installation(),
        repositories: vec![repo_descriptor()],
    };

    h.orchestrator.handle_event(event.clone()).await.unwrap();
    h.orchestrator.handle_event(event).await.unwrap();

    // Exactly one repo record under the linked org, with the default
    // generated config.
    let canonical = canonical_repo_name("acme/infra");
    assert_eq!(canonical, "acme-infra");
    let repo = h.repos.get_repo(&h.org_id, &canonical).await.unwrap().unwrap();
    assert!(repo.config_yaml.contains("generate_projects"));
    assert!(!repo.main_branch_config);

    // Still exactly one active link.
    let link = h.installations.get_link(INSTALLATION_ID).await.unwrap().unwrap();
    assert!(link.active);
    assert_eq!(link.organization_id, h.org_id);
}

#[tokio::test]
async fn test_disjoint_changed_files_create_no_batch() {
    let client = FakeVcsClient::new()
        .with_branch_info("feature/x", "abc123")
        .with_changed_files(&["docs/README.md"]);
    let h = harness(client, layered_config_cloner()).await;

    let outcome = h
        .orchestrator
        .handle_event(WebhookEvent::PullRequest(pr_event("opened", false)))
        .await
        .unwrap();

    assert_eq!(outcome, PipelineOutcome::NoImpact);
    assert!(h.ci.triggered.lock().unwrap().is_empty());
    // The status still settles so the change request is not left pending.
    let status = h.client.last_status().unwrap();
    assert_eq!(status.state, StatusState::Success);
}

#[tokio::test]
async fn test_change_under_dependency_root_impacts_dependents() {
    let client = FakeVcsClient::new()
        .with_branch_info("feature/x", "abc123")
        .with_changed_files(&["infra/vpc/network.tf"]);
    let h = harness(client, layered_config_cloner()).await;

    let outcome = h
        .orchestrator
        .handle_event(WebhookEvent::PullRequest(pr_event("opened", false)))
        .await
        .unwrap();

    let PipelineOutcome::BatchCreated { batch_id, job_count } = outcome else {
        panic!("expected a batch");
    };
    assert_eq!(job_count, 2);

    let jobs = h.batches.get_jobs(&batch_id).await.unwrap();
    assert_eq!(jobs[0].project_name, "vpc");
    assert_eq!(jobs[1].project_name, "core");
    assert_eq!(h.ci.triggered.lock().unwrap().as_slice(), [batch_id]);
}

#[tokio::test]
async fn test_plan_and_apply_commands_classify_the_batch() {
    let client = FakeVcsClient::new()
        .with_branch_info("feature/x", "abc123")
        .with_changed_files(&["infra/vpc/network.tf"]);
    let h = harness(client, layered_config_cloner()).await;

    let outcome = h
        .orchestrator
        .handle_command(&pr_event("opened", false), "digger apply")
        .await
        .unwrap();
    let PipelineOutcome::BatchCreated { batch_id, .. } = outcome else {
        panic!("expected a batch");
    };
    let batch = h.batches.get_batch(&batch_id).await.unwrap().unwrap();
    assert_eq!(batch.batch_type, BatchType::Apply);

    let outcome = h
        .orchestrator
        .handle_command(&pr_event("opened", false), "digger plan")
        .await
        .unwrap();
    let PipelineOutcome::BatchCreated { batch_id, .. } = outcome else {
        panic!("expected a batch");
    };
    let batch = h.batches.get_batch(&batch_id).await.unwrap().unwrap();
    assert_eq!(batch.batch_type, BatchType::Plan);
}

#[tokio::test]
async fn test_lock_and_unlock_toggle_locks_without_a_batch() {
    let client = FakeVcsClient::new()
        .with_branch_info("feature/x", "abc123")
        .with_changed_files(&["infra/vpc/network.tf"]);
    let h = harness(client, layered_config_cloner()).await;

    let outcome = h
        .orchestrator
        .handle_command(&pr_event("opened", false), "digger lock")
        .await
        .unwrap();
    assert!(matches!(outcome, PipelineOutcome::LocksToggled { .. }));
    assert!(h.ci.triggered.lock().unwrap().is_empty());

    let ns = lock_namespace("acme/infra", "vpc");
    let lock = h.locks.get(&h.org_id, &ns).await.unwrap().unwrap();
    assert_eq!(lock.holder, "pr-7");

    h.orchestrator
        .handle_command(&pr_event("opened", false), "digger unlock")
        .await
        .unwrap();
    assert!(h.locks.get(&h.org_id, &ns).await.unwrap().is_none());
}

#[tokio::test]
async fn test_draft_changes_skipped_unless_config_allows() {
    let client = FakeVcsClient::new()
        .with_branch_info("feature/x", "abc123")
        .with_changed_files(&["infra/vpc/network.tf"]);
    let h = harness(client, layered_config_cloner()).await;

    let outcome = h
        .orchestrator
        .handle_event(WebhookEvent::PullRequest(pr_event("opened", true)))
        .await
        .unwrap();
    assert_eq!(outcome, PipelineOutcome::DraftSkipped);

    // Same change with drafts allowed plans normally.
    let client = FakeVcsClient::new()
        .with_branch_info("feature/x", "abc123")
        .with_changed_files(&["infra/vpc/network.tf"]);
    let cloner = FixtureCloner::new().with_file(
        "digger.yml",
        r#"
allow_draft_prs: true
projects:
  - name: vpc
    dir: infra/vpc
"#,
    );
    let h = harness(client, cloner).await;
    let outcome = h
        .orchestrator
        .handle_event(WebhookEvent::PullRequest(pr_event("opened", true)))
        .await
        .unwrap();
    assert!(matches!(outcome, PipelineOutcome::BatchCreated { .. }));
}

#[tokio::test]
async fn test_push_refreshes_stored_config_with_branch_flag() {
    let h = harness(FakeVcsClient::new(), layered_config_cloner()).await;
    h.orchestrator
        .handle_event(WebhookEvent::InstallationCreated {
            installation: installation(),
            repositories: vec![repo_descriptor()],
        })
        .await
        .unwrap();

    let outcome = h
        .orchestrator
        .handle_event(WebhookEvent::Push(PushEvent {
            installation_id: INSTALLATION_ID,
            repository: repository(),
            git_ref: "refs/heads/main".to_string(),
        }))
        .await
        .unwrap();
    assert_eq!(outcome, PipelineOutcome::ConfigRefreshed { main_branch: true });

    let repo = h
        .repos
        .get_repo(&h.org_id, "acme-infra")
        .await
        .unwrap()
        .unwrap();
    assert!(repo.main_branch_config);
    assert!(repo.config_yaml.contains("depends_on"));

    let outcome = h
        .orchestrator
        .handle_event(WebhookEvent::Push(PushEvent {
            installation_id: INSTALLATION_ID,
            repository: repository(),
            git_ref: "refs/heads/feature/x".to_string(),
        }))
        .await
        .unwrap();
    assert_eq!(outcome, PipelineOutcome::ConfigRefreshed { main_branch: false });
}

#[tokio::test]
async fn test_unlinked_installation_is_rejected() {
    let client = FakeVcsClient::new()
        .with_branch_info("feature/x", "abc123")
        .with_changed_files(&["infra/vpc/network.tf"]);
    let h = harness(client, layered_config_cloner()).await;

    let mut pr = pr_event("opened", false);
    pr.installation_id = 9999;
    let err = h
        .orchestrator
        .handle_event(WebhookEvent::PullRequest(pr))
        .await
        .unwrap_err();
    assert!(matches!(err, BurrowError::UnknownInstallation(9999)));
}

#[tokio::test]
async fn test_callback_with_foreign_installation_creates_no_link() {
    let client = Arc::new(FakeVcsClient::new());
    let provider: Arc<dyn VcsClientProvider> =
        Arc::new(FakeVcsProvider::new(client).with_user_installations(&[1, 2]));

    let err = validate_callback(&provider, "token", INSTALLATION_ID)
        .await
        .unwrap_err();
    assert!(matches!(err, BurrowError::CallbackValidation(_)));
}

#[tokio::test]
async fn test_config_load_failure_reports_one_comment() {
    let client = FakeVcsClient::new()
        .with_branch_info("feature/x", "abc123")
        .with_changed_files(&["infra/vpc/network.tf"]);
    let h = harness(client, FixtureCloner::failing("remote unreachable")).await;

    let err = h
        .orchestrator
        .handle_event(WebhookEvent::PullRequest(pr_event("opened", false)))
        .await
        .unwrap_err();
    assert!(matches!(err, BurrowError::ConfigLoad(_)));

    assert_eq!(h.client.comment_count(), 1);
    let body = h.client.comments.lock().unwrap()[0].body.clone();
    assert!(body.contains("configuration"));
    assert!(h.ci.triggered.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_progress_comment_is_posted_once_per_batch() {
    let client = FakeVcsClient::new()
        .with_branch_info("feature/x", "abc123")
        .with_changed_files(&["infra/vpc/network.tf"]);
    let h = harness(client, layered_config_cloner()).await;

    h.orchestrator
        .handle_event(WebhookEvent::PullRequest(pr_event("opened", false)))
        .await
        .unwrap();

    assert_eq!(h.client.comment_count(), 1);
    let body = h.client.comments.lock().unwrap()[0].body.clone();
    assert!(body.contains("**vpc**"));
    assert!(body.contains("**core**"));
}

#[tokio::test]
async fn test_group_by_module_posts_source_comments() {
    let client = FakeVcsClient::new()
        .with_branch_info("feature/x", "abc123")
        .with_changed_files(&["infra/vpc/network.tf"]);
    let cloner = FixtureCloner::new().with_file(
        "digger.yml",
        r#"
comment_render_mode: group_by_module
projects:
  - name: vpc
    dir: infra/vpc
"#,
    );
    let h = harness(client, cloner).await;

    let outcome = h
        .orchestrator
        .handle_event(WebhookEvent::PullRequest(pr_event("opened", false)))
        .await
        .unwrap();
    let PipelineOutcome::BatchCreated { batch_id, .. } = outcome else {
        panic!("expected a batch");
    };

    // Progress comment plus one per source group.
    assert_eq!(h.client.comment_count(), 2);
    let batch = h.batches.get_batch(&batch_id).await.unwrap().unwrap();
    assert!(batch.source_details.is_some());
}

#[tokio::test]
async fn test_missing_config_file_falls_back_to_generated_project() {
    // Cloner serves an empty tree: no digger.yml at all.
    let client = FakeVcsClient::new()
        .with_branch_info("feature/x", "abc123")
        .with_changed_files(&["anything/main.tf"]);
    let h = harness(client, FixtureCloner::new()).await;

    let outcome = h
        .orchestrator
        .handle_event(WebhookEvent::PullRequest(pr_event("opened", false)))
        .await
        .unwrap();
    let PipelineOutcome::BatchCreated { batch_id, .. } = outcome else {
        panic!("expected a batch");
    };
    let jobs = h.batches.get_jobs(&batch_id).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].project_name, "default");
}

#[tokio::test]
async fn test_installation_deleted_deactivates_the_link() {
    let h = harness(FakeVcsClient::new(), FixtureCloner::new()).await;
    h.orchestrator
        .handle_event(WebhookEvent::InstallationCreated {
            installation: installation(),
            repositories: vec![repo_descriptor()],
        })
        .await
        .unwrap();

    let outcome = h
        .orchestrator
        .handle_event(WebhookEvent::InstallationDeleted {
            installation: installation(),
            repositories: vec![repo_descriptor()],
        })
        .await
        .unwrap();
    assert_eq!(outcome, PipelineOutcome::InstallationDeactivated);
    assert!(h.installations.get_link(INSTALLATION_ID).await.unwrap().is_none());
}
