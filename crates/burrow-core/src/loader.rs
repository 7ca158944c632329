//! Config and dependency-graph loading from a repository ref.
//!
//! Clones the repository into a scoped working copy, parses the
//! declarative config and builds the project graph. Any failure along the
//! way (transport, parse, cycle) surfaces as a single `ConfigLoad` error
//! carrying the cause, and nothing is applied to stored state. The raw
//! config text travels with the parsed form so it can be persisted
//! verbatim for audit and replay.

use tracing::{debug, info};

use crate::config::{parse_config, RepoConfig, CONFIG_FILE_NAME, DEFAULT_GENERATED_CONFIG};
use crate::error::{BurrowError, Result};
use crate::graph::ProjectGraph;
use crate::workdir::RepoCloner;

/// Everything resolution needs from one config load.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: RepoConfig,
    /// Raw config text, exactly as read from the repository.
    pub raw_yaml: String,
    pub graph: ProjectGraph,
}

/// Clone `clone_url` at `branch` and load its project configuration.
pub async fn load_repo_config(
    cloner: &dyn RepoCloner,
    clone_url: &str,
    branch: &str,
    token: Option<&str>,
) -> Result<LoadedConfig> {
    let checkout = cloner
        .clone_at(clone_url, branch, token)
        .await
        .map_err(|e| BurrowError::ConfigLoad(e.to_string()))?;

    // A repository without a config file gets the default generation
    // rule: one project rooted at the repository root.
    let raw_yaml = match checkout.read_file(CONFIG_FILE_NAME) {
        Some(text) => text,
        None => {
            debug!("no {CONFIG_FILE_NAME} found, using default generated config");
            DEFAULT_GENERATED_CONFIG.to_string()
        }
    };

    let loaded = load_from_yaml(&raw_yaml)?;
    info!(
        projects = loaded.graph.len(),
        branch, "config loaded successfully"
    );
    Ok(loaded)
    // `checkout` drops here; the working copy is gone on every path.
}

/// Parse config text and build its graph without touching the filesystem.
pub fn load_from_yaml(raw_yaml: &str) -> Result<LoadedConfig> {
    let config = parse_config(raw_yaml).map_err(|e| BurrowError::ConfigLoad(e.to_string()))?;
    let graph =
        ProjectGraph::from_config(&config).map_err(|e| BurrowError::ConfigLoad(e.to_string()))?;
    Ok(LoadedConfig {
        config,
        raw_yaml: raw_yaml.to_string(),
        graph,
    })
}
