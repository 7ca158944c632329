//! Error types for the Burrow orchestration core.
//!
//! The variants follow the pipeline stages: transport validation, identity
//! resolution, configuration loading, planning, locking, reporting. Errors
//! from collaborators are wrapped with stage context here; store- and
//! client-specific shapes never cross the component boundary.

use thiserror::Error;

/// Errors produced by the orchestration core.
#[derive(Debug, Error)]
pub enum BurrowError {
    /// Malformed or unsigned webhook payload. No state was mutated.
    #[error("invalid webhook payload: {0}")]
    InvalidWebhook(String),

    /// No active installation link for the given installation id.
    #[error("no active installation link for installation {0}")]
    UnknownInstallation(i64),

    /// Organization lookup miss.
    #[error("organization not found: {0}")]
    OrganizationNotFound(String),

    /// Repo lookup miss for a linked installation.
    #[error("repo not found for organization {org_id}: {canonical_name}")]
    RepoNotFound {
        org_id: String,
        canonical_name: String,
    },

    /// Clone failure, parse failure, or a cyclic dependency declaration.
    /// Carries the underlying cause; the bad config is never partially
    /// applied to stored state.
    #[error("configuration load failed: {0}")]
    ConfigLoad(String),

    /// A dependency cycle was detected in the project graph.
    #[error("dependency cycle detected involving projects: {projects:?}")]
    DependencyCycle { projects: Vec<String> },

    /// A declared dependency references an unknown project.
    #[error("project not found in graph: {project}")]
    ProjectNotFound { project: String },

    /// Git subprocess failure.
    #[error("git error: {0}")]
    Git(String),

    /// VCS provider call failure.
    #[error("vcs client error: {0}")]
    Vcs(String),

    /// Job planning failure (unknown command, inconsistent context).
    #[error("planning error: {0}")]
    Planning(String),

    /// A project lock could not be taken for a job.
    #[error("could not acquire lock on {namespace} for {holder}")]
    LockUnavailable { namespace: String, holder: String },

    /// Installation callback validation failure.
    #[error("callback validation failed: {0}")]
    CallbackValidation(String),

    /// A persistence layer error.
    #[error("state error: {0}")]
    State(#[from] burrow_state::StateError),
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, BurrowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_cycle_error_displays_project_names() {
        let err = BurrowError::DependencyCycle {
            projects: vec!["core".to_string(), "edge".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("core"));
        assert!(msg.contains("edge"));
    }

    #[test]
    fn test_config_load_carries_cause() {
        let err = BurrowError::ConfigLoad("unknown dependency 'vpc'".to_string());
        assert!(err.to_string().contains("unknown dependency 'vpc'"));
    }

    #[test]
    fn test_state_error_bubbles_up() {
        let state = burrow_state::StateError::NotFound {
            entity: "repo",
            key: "acme-infra".to_string(),
        };
        let err = BurrowError::from(state);
        assert!(matches!(err, BurrowError::State(_)));
    }
}
