//! Change-impact resolution.
//!
//! Seeds the impacted set with every project whose watched paths intersect
//! the changed-file list, then walks the dependency graph to add transitive
//! dependents, so a change in a shared module re-triggers everything that
//! depends on it. An empty result is a valid terminal outcome: the pipeline
//! skips without creating a batch.

use std::collections::{HashMap, HashSet};

use crate::config::RepoConfig;
use crate::graph::ProjectGraph;

/// The ordered, deduplicated impact of one change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImpactSet {
    /// Impacted project names, in config declaration order. This order is
    /// also the lock acquisition order, so it must be stable.
    pub projects: Vec<String>,
    /// Which changed files triggered which directly-matched project.
    /// Transitively impacted projects carry no file entries.
    pub source_mapping: HashMap<String, Vec<String>>,
}

impl ImpactSet {
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

/// Resolve the impacted projects for a changed-file list.
pub fn resolve_impact(
    config: &RepoConfig,
    graph: &ProjectGraph,
    changed_files: &[String],
) -> ImpactSet {
    let projects = config.resolved_projects();

    let mut source_mapping: HashMap<String, Vec<String>> = HashMap::new();
    let mut seeds: Vec<String> = Vec::new();
    for project in &projects {
        let matched: Vec<String> = changed_files
            .iter()
            .filter(|f| project.watches(f))
            .cloned()
            .collect();
        if !matched.is_empty() {
            seeds.push(project.name.clone());
            source_mapping.insert(project.name.clone(), matched);
        }
    }

    let dependents = graph.transitive_dependents(seeds.iter().map(String::as_str));

    let mut impacted: HashSet<&String> = seeds.iter().collect();
    impacted.extend(dependents.iter());

    // Project the union back onto declaration order.
    let ordered = projects
        .iter()
        .filter(|p| impacted.contains(&p.name))
        .map(|p| p.name.clone())
        .collect();

    ImpactSet {
        projects: ordered,
        source_mapping,
    }
}
