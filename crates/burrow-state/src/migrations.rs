//! SurrealDB schema initialization for Burrow.
//!
//! Defines every table with the unique indexes that carry the idempotence
//! guarantees the webhook handlers rely on: duplicate deliveries race on
//! inserts and the constraint, not an in-process check, decides the winner.

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::{StateError, StateResult};

/// Initialize all Burrow tables.
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> StateResult<()> {
    info!("Initializing Burrow SurrealDB schema");

    init_organizations_table(db).await?;
    init_installation_links_table(db).await?;
    init_installation_repos_table(db).await?;
    init_apps_table(db).await?;
    init_repos_table(db).await?;
    init_batches_table(db).await?;
    init_jobs_table(db).await?;
    init_locks_table(db).await?;

    info!("Burrow schema initialization complete");
    Ok(())
}

async fn run(db: &Surreal<Any>, sql: &str) -> StateResult<()> {
    db.query(sql)
        .await
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;
    Ok(())
}

async fn init_organizations_table(db: &Surreal<Any>) -> StateResult<()> {
    debug!("Initializing organizations table");
    run(
        db,
        r#"
        DEFINE TABLE organizations SCHEMALESS;
        DEFINE INDEX idx_org_id ON TABLE organizations COLUMNS org_id UNIQUE;
    "#,
    )
    .await
}

async fn init_installation_links_table(db: &Surreal<Any>) -> StateResult<()> {
    debug!("Initializing installation_links table");
    // One row per installation id; the active flag is flipped in place so
    // "at most one active link per installation" holds by construction.
    run(
        db,
        r#"
        DEFINE TABLE installation_links SCHEMALESS;
        DEFINE INDEX idx_link_installation ON TABLE installation_links COLUMNS installation_id UNIQUE;
        DEFINE INDEX idx_link_org ON TABLE installation_links COLUMNS organization_id;
    "#,
    )
    .await
}

async fn init_installation_repos_table(db: &Surreal<Any>) -> StateResult<()> {
    debug!("Initializing installation_repos table");
    run(
        db,
        r#"
        DEFINE TABLE installation_repos SCHEMALESS;
        DEFINE INDEX idx_installation_repo ON TABLE installation_repos COLUMNS installation_id, repo_full_name UNIQUE;
    "#,
    )
    .await
}

async fn init_apps_table(db: &Surreal<Any>) -> StateResult<()> {
    debug!("Initializing apps table");
    run(
        db,
        r#"
        DEFINE TABLE apps SCHEMALESS;
        DEFINE INDEX idx_app_id ON TABLE apps COLUMNS app_id UNIQUE;
    "#,
    )
    .await
}

async fn init_repos_table(db: &Surreal<Any>) -> StateResult<()> {
    debug!("Initializing repos table");
    // The unique (organization, canonical name) pair makes lazy repo
    // creation safe under concurrent duplicate events.
    run(
        db,
        r#"
        DEFINE TABLE repos SCHEMALESS;
        DEFINE INDEX idx_repo_identity ON TABLE repos COLUMNS organization_id, canonical_name UNIQUE;
    "#,
    )
    .await
}

async fn init_batches_table(db: &Surreal<Any>) -> StateResult<()> {
    debug!("Initializing batches table");
    run(
        db,
        r#"
        DEFINE TABLE batches SCHEMALESS;
        DEFINE INDEX idx_batch_id ON TABLE batches COLUMNS batch_id UNIQUE;
        DEFINE INDEX idx_batch_org ON TABLE batches COLUMNS organization_id;
    "#,
    )
    .await
}

async fn init_jobs_table(db: &Surreal<Any>) -> StateResult<()> {
    debug!("Initializing jobs table");
    run(
        db,
        r#"
        DEFINE TABLE jobs SCHEMALESS;
        DEFINE INDEX idx_job_id ON TABLE jobs COLUMNS job_id UNIQUE;
        DEFINE INDEX idx_job_batch ON TABLE jobs COLUMNS batch_id;
    "#,
    )
    .await
}

async fn init_locks_table(db: &Surreal<Any>) -> StateResult<()> {
    debug!("Initializing locks table");
    run(
        db,
        r#"
        DEFINE TABLE locks SCHEMALESS;
        DEFINE INDEX idx_lock_namespace ON TABLE locks COLUMNS organization_id, namespace UNIQUE;
    "#,
    )
    .await
}
