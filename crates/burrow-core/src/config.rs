//! Declarative project configuration (`digger.yml`).
//!
//! A repository declares either explicit `projects` (name, dir, optional
//! `depends_on` references) or a `generate_projects` directive used to
//! derive a project when none are explicit. The raw text is persisted
//! verbatim alongside the parsed form for audit and replay.

use serde::{Deserialize, Serialize};

use crate::error::{BurrowError, Result};

/// Name of the config file at the repository root.
pub const CONFIG_FILE_NAME: &str = "digger.yml";

/// Config written for repositories that are linked before they carry a
/// config file of their own: a single generated project at the repo root.
pub const DEFAULT_GENERATED_CONFIG: &str = "generate_projects:\n include: \".\"\n";

/// How job progress is rendered on the change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentRenderMode {
    /// One aggregate progress comment.
    #[default]
    Basic,
    /// Additional per-source-file-group comments.
    GroupByModule,
}

/// An explicit project declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub dir: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Project {
    /// Watched-path predicate: does a changed file fall under this
    /// project's directory? A dir of `.` watches the whole repository.
    pub fn watches(&self, changed_path: &str) -> bool {
        let dir = self.dir.trim_end_matches('/');
        if dir.is_empty() || dir == "." {
            return true;
        }
        changed_path == dir || changed_path.starts_with(&format!("{dir}/"))
    }
}

/// The `generate_projects` directive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateProjects {
    /// Directory pattern to derive the project from.
    pub include: String,
}

/// Parsed repository configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RepoConfig {
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub generate_projects: Option<GenerateProjects>,
    #[serde(default)]
    pub allow_draft_prs: bool,
    #[serde(default)]
    pub comment_render_mode: CommentRenderMode,
}

impl RepoConfig {
    /// Effective project set: the explicit declarations, or one project
    /// synthesized from `generate_projects` when none are declared.
    pub fn resolved_projects(&self) -> Vec<Project> {
        if !self.projects.is_empty() {
            return self.projects.clone();
        }
        match &self.generate_projects {
            Some(generate) => vec![Project {
                name: "default".to_string(),
                dir: generate.include.clone(),
                depends_on: Vec::new(),
            }],
            None => Vec::new(),
        }
    }

    /// Look up an explicit or generated project by name.
    pub fn project(&self, name: &str) -> Option<Project> {
        self.resolved_projects().into_iter().find(|p| p.name == name)
    }
}

/// Parse and validate a `digger.yml` document.
///
/// Duplicate project names and dependency references to undeclared
/// projects are rejected here so a bad config never reaches the graph.
pub fn parse_config(yaml: &str) -> Result<RepoConfig> {
    let config: RepoConfig =
        serde_yaml::from_str(yaml).map_err(|e| BurrowError::ConfigLoad(e.to_string()))?;

    let projects = config.resolved_projects();
    for (i, project) in projects.iter().enumerate() {
        if projects[..i].iter().any(|p| p.name == project.name) {
            return Err(BurrowError::ConfigLoad(format!(
                "duplicate project name: {}",
                project.name
            )));
        }
        for dep in &project.depends_on {
            if !projects.iter().any(|p| &p.name == dep) {
                return Err(BurrowError::ConfigLoad(format!(
                    "project {} depends on unknown project {}",
                    project.name, dep
                )));
            }
        }
    }

    Ok(config)
}
