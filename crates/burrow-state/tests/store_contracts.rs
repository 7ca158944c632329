//! Contract tests for the Burrow store traits.
//!
//! Each contract is a shared check body run twice: once against the
//! in-memory fakes and once against a `mem://` SurrealDB instance. Any
//! conforming backend must pass the same assertions; in particular the
//! idempotence guarantees the webhook handlers rely on under
//! at-least-once delivery.

use chrono::{Duration, Utc};
use burrow_state::fakes::{
    MemoryBatchStore, MemoryInstallationStore, MemoryLockStore, MemoryRepoStore,
};
use burrow_state::records::*;
use burrow_state::stores::*;
use burrow_state::SurrealStores;

async fn surreal() -> SurrealStores {
    SurrealStores::in_memory().await.unwrap()
}

fn sample_repo(org_id: &str) -> RepoRecord {
    RepoRecord {
        organization_id: org_id.to_string(),
        canonical_name: canonical_repo_name("acme/infra"),
        full_name: "acme/infra".to_string(),
        owner_login: "acme".to_string(),
        name: "infra".to_string(),
        clone_url: "https://github.com/acme/infra".to_string(),
        config_yaml: "generate_projects:\n include: \".\"\n".to_string(),
        main_branch_config: false,
        created_at: Utc::now(),
    }
}

fn sample_batch(org_id: &str) -> BatchRecord {
    BatchRecord::new(
        BatchType::Plan,
        org_id,
        42,
        "acme/infra",
        "acme",
        "infra",
        "feature/x",
        "abc123",
        7,
    )
}

// ===========================================================================
// InstallationStore contract
// ===========================================================================

async fn check_organization_round_trip(store: &dyn InstallationStore) {
    let org = store.create_organization("acme").await.unwrap();

    let fetched = store.get_organization(&org.org_id).await.unwrap().unwrap();

    assert_eq!(fetched.org_id, org.org_id);
    assert_eq!(fetched.name, "acme");
    assert!(store.get_organization("no-such-org").await.unwrap().is_none());
}

#[tokio::test]
async fn organization_round_trips() {
    check_organization_round_trip(&MemoryInstallationStore::new()).await;
    check_organization_round_trip(&surreal().await).await;
}

async fn check_link_installation_idempotent(store: &dyn InstallationStore) {
    let org = store.create_organization("acme").await.unwrap();

    let first = store.link_installation(&org.org_id, 42).await.unwrap();
    let second = store.link_installation(&org.org_id, 42).await.unwrap();

    assert_eq!(first, second);
    assert!(second.active);
}

#[tokio::test]
async fn link_installation_is_idempotent() {
    check_link_installation_idempotent(&MemoryInstallationStore::new()).await;
    check_link_installation_idempotent(&surreal().await).await;
}

async fn check_deactivated_link_invisible(store: &dyn InstallationStore) {
    let org = store.create_organization("acme").await.unwrap();
    store.link_installation(&org.org_id, 42).await.unwrap();

    store.deactivate_link(42).await.unwrap();

    assert!(store.get_link(42).await.unwrap().is_none());
}

#[tokio::test]
async fn deactivated_link_is_kept_but_invisible() {
    check_deactivated_link_invisible(&MemoryInstallationStore::new()).await;
    check_deactivated_link_invisible(&surreal().await).await;
}

async fn check_deactivate_unknown_link_errors(store: &dyn InstallationStore) {
    let err = store.deactivate_link(999).await.unwrap_err();
    assert!(matches!(err, burrow_state::StateError::NotFound { .. }));
}

#[tokio::test]
async fn deactivate_unknown_link_errors() {
    check_deactivate_unknown_link_errors(&MemoryInstallationStore::new()).await;
    check_deactivate_unknown_link_errors(&surreal().await).await;
}

async fn check_relink_after_uninstall(store: &dyn InstallationStore) {
    let org = store.create_organization("acme").await.unwrap();
    store.link_installation(&org.org_id, 42).await.unwrap();
    store.deactivate_link(42).await.unwrap();

    let relinked = store.link_installation(&org.org_id, 42).await.unwrap();

    assert!(relinked.active);
    assert!(store.get_link(42).await.unwrap().is_some());
}

#[tokio::test]
async fn relink_after_uninstall_reactivates() {
    check_relink_after_uninstall(&MemoryInstallationStore::new()).await;
    check_relink_after_uninstall(&surreal().await).await;
}

async fn check_repo_readd_reactivates(store: &dyn InstallationStore) {
    store
        .record_repo_added(42, 1, "acme", 100, "acme/infra")
        .await
        .unwrap();
    store.record_repo_removed(42, 1, "acme/infra").await.unwrap();
    let readded = store
        .record_repo_added(42, 1, "acme", 100, "acme/infra")
        .await
        .unwrap();

    assert!(readded.active);
}

#[tokio::test]
async fn repo_added_then_removed_then_added_reactivates() {
    check_repo_readd_reactivates(&MemoryInstallationStore::new()).await;
    check_repo_readd_reactivates(&surreal().await).await;
}

// ===========================================================================
// RepoStore contract
// ===========================================================================

async fn check_create_repo_twice(store: &dyn RepoStore) {
    let first = store.create_repo(sample_repo("org-1")).await.unwrap();

    let mut duplicate = sample_repo("org-1");
    duplicate.config_yaml = "projects: []".to_string();
    let second = store.create_repo(duplicate).await.unwrap();

    // The duplicate creation resolves to the stored record.
    assert_eq!(second.config_yaml, first.config_yaml);
}

#[tokio::test]
async fn create_repo_twice_returns_existing() {
    check_create_repo_twice(&MemoryRepoStore::new()).await;
    check_create_repo_twice(&surreal().await).await;
}

async fn check_repos_scoped_per_org(store: &dyn RepoStore) {
    store.create_repo(sample_repo("org-1")).await.unwrap();

    assert!(store
        .get_repo("org-2", "acme-infra")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn repos_are_scoped_per_organization() {
    check_repos_scoped_per_org(&MemoryRepoStore::new()).await;
    check_repos_scoped_per_org(&surreal().await).await;
}

async fn check_update_repo_config(store: &dyn RepoStore) {
    store.create_repo(sample_repo("org-1")).await.unwrap();

    store
        .update_repo_config("org-1", "acme-infra", "projects: []", true)
        .await
        .unwrap();

    let repo = store.get_repo("org-1", "acme-infra").await.unwrap().unwrap();
    assert_eq!(repo.config_yaml, "projects: []");
    assert!(repo.main_branch_config);
}

#[tokio::test]
async fn update_repo_config_sets_main_branch_flag() {
    check_update_repo_config(&MemoryRepoStore::new()).await;
    check_update_repo_config(&surreal().await).await;
}

// ===========================================================================
// BatchStore contract
// ===========================================================================

async fn check_batch_created_with_jobs(store: &dyn BatchStore) {
    let batch = sample_batch("org-1");
    let batch_id = batch.batch_id.clone();
    let jobs = vec![
        JobRecord::new(&batch_id, "core", vec!["digger plan".to_string()]),
        JobRecord::new(&batch_id, "edge", vec!["digger plan".to_string()]),
    ];

    store.create_batch_with_jobs(batch, jobs).await.unwrap();

    let stored = store.get_batch(&batch_id).await.unwrap().unwrap();
    assert_eq!(stored.status, BatchStatus::Created);
    assert_eq!(store.get_jobs(&batch_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn batch_is_created_with_all_jobs() {
    check_batch_created_with_jobs(&MemoryBatchStore::new()).await;
    check_batch_created_with_jobs(&surreal().await).await;
}

async fn check_duplicate_batch_rejected(store: &dyn BatchStore) {
    let batch = sample_batch("org-1");
    store
        .create_batch_with_jobs(batch.clone(), vec![])
        .await
        .unwrap();

    assert!(store.create_batch_with_jobs(batch, vec![]).await.is_err());
}

#[tokio::test]
async fn duplicate_batch_id_is_rejected() {
    check_duplicate_batch_rejected(&MemoryBatchStore::new()).await;
    check_duplicate_batch_rejected(&surreal().await).await;
}

async fn check_comment_id_first_write_wins(store: &dyn BatchStore) {
    let batch = sample_batch("org-1");
    let batch_id = batch.batch_id.clone();
    store.create_batch_with_jobs(batch, vec![]).await.unwrap();

    let first = store.set_batch_comment_id(&batch_id, 1001).await.unwrap();
    let second = store.set_batch_comment_id(&batch_id, 2002).await.unwrap();

    assert_eq!(first, 1001);
    assert_eq!(second, 1001);
    let stored = store.get_batch(&batch_id).await.unwrap().unwrap();
    assert_eq!(stored.comment_id, Some(1001));
}

#[tokio::test]
async fn comment_id_first_write_wins() {
    check_comment_id_first_write_wins(&MemoryBatchStore::new()).await;
    check_comment_id_first_write_wins(&surreal().await).await;
}

async fn check_batch_status_round_trip(store: &dyn BatchStore) {
    let batch = sample_batch("org-1");
    let batch_id = batch.batch_id.clone();
    store.create_batch_with_jobs(batch, vec![]).await.unwrap();

    store
        .update_batch_status(&batch_id, BatchStatus::Running)
        .await
        .unwrap();

    let stored = store.get_batch(&batch_id).await.unwrap().unwrap();
    assert_eq!(stored.status, BatchStatus::Running);
}

#[tokio::test]
async fn batch_status_update_round_trips() {
    check_batch_status_round_trip(&MemoryBatchStore::new()).await;
    check_batch_status_round_trip(&surreal().await).await;
}

async fn check_job_status_visible_through_batch(store: &dyn BatchStore) {
    let batch = sample_batch("org-1");
    let batch_id = batch.batch_id.clone();
    let job = JobRecord::new(&batch_id, "core", vec!["digger plan".to_string()]);
    let job_id = job.job_id.clone();
    store.create_batch_with_jobs(batch, vec![job]).await.unwrap();

    store
        .update_job_status(&job_id, JobStatus::Succeeded)
        .await
        .unwrap();

    let jobs = store.get_jobs(&batch_id).await.unwrap();
    assert_eq!(jobs[0].status, JobStatus::Succeeded);
}

#[tokio::test]
async fn job_status_updates_are_visible_through_batch() {
    check_job_status_visible_through_batch(&MemoryBatchStore::new()).await;
    check_job_status_visible_through_batch(&surreal().await).await;
}

async fn check_jobs_keep_creation_order(store: &dyn BatchStore) {
    let batch = sample_batch("org-1");
    let batch_id = batch.batch_id.clone();
    let jobs = vec![
        JobRecord::new(&batch_id, "vpc", vec!["digger plan".to_string()]),
        JobRecord::new(&batch_id, "core", vec!["digger plan".to_string()]),
        JobRecord::new(&batch_id, "edge", vec!["digger plan".to_string()]),
    ];
    store.create_batch_with_jobs(batch, jobs).await.unwrap();

    // Touching a later job must not reorder the listing.
    let stored = store.get_jobs(&batch_id).await.unwrap();
    store
        .update_job_status(&stored[2].job_id, JobStatus::Running)
        .await
        .unwrap();

    let names: Vec<String> = store
        .get_jobs(&batch_id)
        .await
        .unwrap()
        .into_iter()
        .map(|j| j.project_name)
        .collect();
    assert_eq!(names, vec!["vpc", "core", "edge"]);
}

#[tokio::test]
async fn jobs_come_back_in_creation_order() {
    check_jobs_keep_creation_order(&MemoryBatchStore::new()).await;
    check_jobs_keep_creation_order(&surreal().await).await;
}

// ===========================================================================
// LockStore contract
// ===========================================================================

async fn check_lock_excludes_second_holder(store: &dyn LockStore) {
    let lease = Duration::minutes(30);

    assert!(store
        .try_acquire("org-1", "acme/infra#core", "batch-1", lease)
        .await
        .unwrap());
    assert!(!store
        .try_acquire("org-1", "acme/infra#core", "batch-2", lease)
        .await
        .unwrap());
}

#[tokio::test]
async fn lock_excludes_second_holder() {
    check_lock_excludes_second_holder(&MemoryLockStore::new()).await;
    check_lock_excludes_second_holder(&surreal().await).await;
}

async fn check_lock_reacquire_extends(store: &dyn LockStore) {
    let lease = Duration::minutes(30);

    assert!(store
        .try_acquire("org-1", "acme/infra#core", "batch-1", lease)
        .await
        .unwrap());
    assert!(store
        .try_acquire("org-1", "acme/infra#core", "batch-1", lease)
        .await
        .unwrap());
}

#[tokio::test]
async fn lock_reacquire_by_holder_extends() {
    check_lock_reacquire_extends(&MemoryLockStore::new()).await;
    check_lock_reacquire_extends(&surreal().await).await;
}

async fn check_expired_lease_stealable(store: &dyn LockStore) {
    // Negative lease: expires immediately.
    assert!(store
        .try_acquire("org-1", "acme/infra#core", "batch-1", Duration::minutes(-1))
        .await
        .unwrap());
    assert!(store
        .try_acquire("org-1", "acme/infra#core", "batch-2", Duration::minutes(30))
        .await
        .unwrap());

    let lock = store.get("org-1", "acme/infra#core").await.unwrap().unwrap();
    assert_eq!(lock.holder, "batch-2");
}

#[tokio::test]
async fn expired_lease_is_stealable() {
    check_expired_lease_stealable(&MemoryLockStore::new()).await;
    check_expired_lease_stealable(&surreal().await).await;
}

async fn check_release_by_non_holder_noop(store: &dyn LockStore) {
    let lease = Duration::minutes(30);
    store
        .try_acquire("org-1", "acme/infra#core", "batch-1", lease)
        .await
        .unwrap();

    store
        .release("org-1", "acme/infra#core", "batch-2")
        .await
        .unwrap();

    let lock = store.get("org-1", "acme/infra#core").await.unwrap().unwrap();
    assert_eq!(lock.holder, "batch-1");
}

#[tokio::test]
async fn release_by_non_holder_is_noop() {
    check_release_by_non_holder_noop(&MemoryLockStore::new()).await;
    check_release_by_non_holder_noop(&surreal().await).await;
}

async fn check_release_by_holder_frees(store: &dyn LockStore) {
    let lease = Duration::minutes(30);
    store
        .try_acquire("org-1", "acme/infra#core", "batch-1", lease)
        .await
        .unwrap();

    store
        .release("org-1", "acme/infra#core", "batch-1")
        .await
        .unwrap();

    assert!(store.get("org-1", "acme/infra#core").await.unwrap().is_none());
    assert!(store
        .try_acquire("org-1", "acme/infra#core", "batch-2", lease)
        .await
        .unwrap());
}

#[tokio::test]
async fn release_by_holder_frees_lock() {
    check_release_by_holder_frees(&MemoryLockStore::new()).await;
    check_release_by_holder_frees(&surreal().await).await;
}

async fn check_locks_scoped_per_org(store: &dyn LockStore) {
    let lease = Duration::minutes(30);

    assert!(store
        .try_acquire("org-1", "acme/infra#core", "batch-1", lease)
        .await
        .unwrap());
    // Same namespace under a different tenant is an independent lock.
    assert!(store
        .try_acquire("org-2", "acme/infra#core", "batch-2", lease)
        .await
        .unwrap());
}

#[tokio::test]
async fn locks_are_scoped_per_organization() {
    check_locks_scoped_per_org(&MemoryLockStore::new()).await;
    check_locks_scoped_per_org(&surreal().await).await;
}
