//! Burrow orchestration core.
//!
//! Decodes provider webhook events, resolves them against stored state,
//! plans per-project jobs, coordinates batch execution under project
//! locks, and reports progress back to the change request. Persistence
//! lives in `burrow-state`; everything here depends on its trait
//! contracts, never on a concrete backend.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod fakes;
pub mod graph;
pub mod impact;
pub mod loader;
pub mod locks;
pub mod orchestrator;
pub mod planner;
pub mod reporter;
pub mod setup;
pub mod vcs;
pub mod webhook;
pub mod workdir;

pub use config::{parse_config, CommentRenderMode, Project, RepoConfig};
pub use coordinator::BatchCoordinator;
pub use error::{BurrowError, Result};
pub use events::{parse_webhook, PullRequestEvent, PushEvent, WebhookEvent};
pub use graph::ProjectGraph;
pub use impact::{resolve_impact, ImpactSet};
pub use loader::{load_from_yaml, load_repo_config, LoadedConfig};
pub use locks::LockManager;
pub use orchestrator::{CiBackend, Orchestrator, PipelineOutcome};
pub use planner::{batch_type, plan_jobs, Job, TriggerCommand, TriggerContext};
pub use reporter::CommentReporter;
pub use setup::{app_manifest, validate_callback, AppManifest, ExchangedCredentials};
pub use vcs::{BranchInfo, StatusState, VcsClient, VcsClientProvider};
pub use webhook::{compute_webhook_signature, verify_webhook_signature};
pub use workdir::{ClonedRepo, GitCloner, RepoCloner};
