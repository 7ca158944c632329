//! Project dependency graph.
//!
//! Models projects as nodes in a directed graph. An edge `A → B` means
//! "B depends on A" — a change impacting A also impacts B. The graph is
//! rebuilt from scratch on every resolution; no incremental mutation
//! guarantees are offered or needed.
//!
//! Edges are stored as `dependency → dependents` adjacency sets with
//! insertion order retained so traversal output is deterministic. Cycles
//! are detected at insertion time via DFS.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::config::RepoConfig;
use crate::error::{BurrowError, Result};

/// Directed dependency graph over project names.
#[derive(Debug, Clone, Default)]
pub struct ProjectGraph {
    /// Project names in insertion (config declaration) order.
    order: Vec<String>,
    /// `dependency → {dependent, ...}` (downstream adjacency)
    downstream: HashMap<String, HashSet<String>>,
    /// `dependent → {dependency, ...}` (upstream adjacency)
    upstream: HashMap<String, HashSet<String>>,
}

impl ProjectGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph from a parsed config: one node per resolved
    /// project, one edge per `depends_on` reference.
    pub fn from_config(config: &RepoConfig) -> Result<Self> {
        let mut graph = Self::new();
        let projects = config.resolved_projects();
        for project in &projects {
            graph.add_project(&project.name);
        }
        for project in &projects {
            for dep in &project.depends_on {
                graph.add_dependency(&project.name, dep)?;
            }
        }
        Ok(graph)
    }

    /// Register a project node. Idempotent.
    pub fn add_project(&mut self, name: &str) {
        if !self.downstream.contains_key(name) {
            self.order.push(name.to_string());
            self.downstream.insert(name.to_string(), HashSet::new());
            self.upstream.insert(name.to_string(), HashSet::new());
        }
    }

    /// Add a dependency edge: `dependent` depends on `dependency`.
    ///
    /// Both nodes must already be registered. Rejects edges that would
    /// close a cycle.
    pub fn add_dependency(&mut self, dependent: &str, dependency: &str) -> Result<()> {
        if !self.downstream.contains_key(dependent) {
            return Err(BurrowError::ProjectNotFound {
                project: dependent.to_string(),
            });
        }
        if !self.downstream.contains_key(dependency) {
            return Err(BurrowError::ProjectNotFound {
                project: dependency.to_string(),
            });
        }
        if dependent == dependency || self.reaches(dependent, dependency) {
            return Err(BurrowError::DependencyCycle {
                projects: vec![dependency.to_string(), dependent.to_string()],
            });
        }
        self.downstream
            .get_mut(dependency)
            .map(|set| set.insert(dependent.to_string()));
        self.upstream
            .get_mut(dependent)
            .map(|set| set.insert(dependency.to_string()));
        Ok(())
    }

    /// Number of registered projects.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True when no projects are registered.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Project names in declaration order.
    pub fn projects(&self) -> &[String] {
        &self.order
    }

    /// Projects that directly depend on `name`, in declaration order.
    pub fn direct_dependents(&self, name: &str) -> Vec<String> {
        let Some(set) = self.downstream.get(name) else {
            return Vec::new();
        };
        self.order
            .iter()
            .filter(|p| set.contains(*p))
            .cloned()
            .collect()
    }

    /// All projects reachable downstream from any of the seeds, the seeds
    /// themselves excluded. Declaration order.
    pub fn transitive_dependents<'a, I>(&self, seeds: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        let mut seed_set: HashSet<String> = HashSet::new();

        for seed in seeds {
            seed_set.insert(seed.to_string());
            queue.push_back(seed.to_string());
        }

        while let Some(current) = queue.pop_front() {
            if let Some(dependents) = self.downstream.get(&current) {
                for dependent in dependents {
                    if visited.insert(dependent.clone()) {
                        queue.push_back(dependent.clone());
                    }
                }
            }
        }

        self.order
            .iter()
            .filter(|p| visited.contains(*p) && !seed_set.contains(*p))
            .cloned()
            .collect()
    }

    /// DFS reachability along downstream edges.
    fn reaches(&self, from: &str, to: &str) -> bool {
        let mut stack = vec![from.to_string()];
        let mut visited = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(next) = self.downstream.get(&current) {
                stack.extend(next.iter().cloned());
            }
        }
        false
    }
}
