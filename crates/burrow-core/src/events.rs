//! Webhook event decoding.
//!
//! The raw delivery (event-type header plus JSON body) is decoded at the
//! boundary into the closed [`WebhookEvent`] variant set, dispatched by
//! exhaustive pattern matching downstream. Only the fields the pipeline
//! actually consumes are modeled.

use serde::Deserialize;

use crate::error::{BurrowError, Result};

/// Installation identity attached to every event we act on.
#[derive(Debug, Clone, PartialEq)]
pub struct Installation {
    pub id: i64,
    pub app_id: i64,
    pub account_login: String,
    pub account_id: i64,
}

/// Repository descriptor carried by installation events.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoDescriptor {
    pub full_name: String,
    pub name: String,
    pub clone_url: String,
}

impl RepoDescriptor {
    /// Owner login, the part of the full name before the slash.
    pub fn owner(&self) -> &str {
        self.full_name.split('/').next().unwrap_or_default()
    }
}

/// Repository identity carried by pull-request and push events.
#[derive(Debug, Clone, PartialEq)]
pub struct Repository {
    pub full_name: String,
    pub name: String,
    pub owner_login: String,
    pub clone_url: String,
    pub default_branch: String,
}

/// A pull-request-like change event.
#[derive(Debug, Clone, PartialEq)]
pub struct PullRequestEvent {
    pub action: String,
    pub installation_id: i64,
    pub repository: Repository,
    pub number: i64,
    pub draft: bool,
    pub head_branch: String,
    pub head_sha: String,
}

/// A push event.
#[derive(Debug, Clone, PartialEq)]
pub struct PushEvent {
    pub installation_id: i64,
    pub repository: Repository,
    /// Full git ref, e.g. `refs/heads/main`.
    pub git_ref: String,
}

impl PushEvent {
    /// Branch name with the `refs/heads/` prefix stripped.
    pub fn branch(&self) -> &str {
        self.git_ref
            .strip_prefix("refs/heads/")
            .unwrap_or(&self.git_ref)
    }

    /// Whether this push targets the repository's default branch.
    pub fn is_default_branch(&self) -> bool {
        self.git_ref.ends_with(&self.repository.default_branch)
    }
}

/// The closed set of webhook events the orchestrator handles.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    InstallationCreated {
        installation: Installation,
        repositories: Vec<RepoDescriptor>,
    },
    InstallationDeleted {
        installation: Installation,
        repositories: Vec<RepoDescriptor>,
    },
    InstallationReposAdded {
        installation: Installation,
        repositories: Vec<RepoDescriptor>,
    },
    InstallationReposRemoved {
        installation: Installation,
        repositories: Vec<RepoDescriptor>,
    },
    PullRequest(PullRequestEvent),
    Push(PushEvent),
    /// Event types we receive but take no action on.
    Ignored { event_type: String },
}

// -- wire shapes -------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WireAccount {
    login: String,
    id: i64,
}

#[derive(Debug, Deserialize)]
struct WireInstallation {
    id: i64,
    app_id: i64,
    account: WireAccount,
}

impl From<WireInstallation> for Installation {
    fn from(w: WireInstallation) -> Self {
        Installation {
            id: w.id,
            app_id: w.app_id,
            account_login: w.account.login,
            account_id: w.account.id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireRepoDescriptor {
    full_name: String,
    name: String,
    #[serde(default)]
    clone_url: Option<String>,
}

impl From<WireRepoDescriptor> for RepoDescriptor {
    fn from(w: WireRepoDescriptor) -> Self {
        // Installation payloads omit the clone URL; derive it from the
        // full name the way the hosted provider serves it.
        let clone_url = w
            .clone_url
            .unwrap_or_else(|| format!("https://github.com/{}", w.full_name));
        RepoDescriptor {
            full_name: w.full_name,
            name: w.name,
            clone_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireRepoOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct WireRepository {
    full_name: String,
    name: String,
    owner: WireRepoOwner,
    clone_url: String,
    default_branch: String,
}

impl From<WireRepository> for Repository {
    fn from(w: WireRepository) -> Self {
        Repository {
            full_name: w.full_name,
            name: w.name,
            owner_login: w.owner.login,
            clone_url: w.clone_url,
            default_branch: w.default_branch,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireInstallationEvent {
    action: String,
    installation: WireInstallation,
    #[serde(default)]
    repositories: Vec<WireRepoDescriptor>,
}

#[derive(Debug, Deserialize)]
struct WireInstallationRepositoriesEvent {
    action: String,
    installation: WireInstallation,
    #[serde(default)]
    repositories_added: Vec<WireRepoDescriptor>,
    #[serde(default)]
    repositories_removed: Vec<WireRepoDescriptor>,
}

#[derive(Debug, Deserialize)]
struct WireInstallationRef {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct WirePullRequestHead {
    #[serde(rename = "ref")]
    branch: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct WirePullRequest {
    number: i64,
    #[serde(default)]
    draft: bool,
    head: WirePullRequestHead,
}

#[derive(Debug, Deserialize)]
struct WirePullRequestEvent {
    action: String,
    installation: WireInstallationRef,
    repository: WireRepository,
    pull_request: WirePullRequest,
}

#[derive(Debug, Deserialize)]
struct WirePushEvent {
    #[serde(rename = "ref")]
    git_ref: String,
    installation: WireInstallationRef,
    repository: WireRepository,
}

// -- decoding ----------------------------------------------------------------

fn decode<'a, T: Deserialize<'a>>(body: &'a [u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| BurrowError::InvalidWebhook(e.to_string()))
}

/// Decode a webhook delivery into a [`WebhookEvent`].
///
/// `event_type` is the value of the `X-GitHub-Event` header. Unknown event
/// types and unhandled actions decode to [`WebhookEvent::Ignored`] rather
/// than erroring, matching at-least-once delivery of event types we never
/// subscribed to.
pub fn parse_webhook(event_type: &str, body: &[u8]) -> Result<WebhookEvent> {
    match event_type {
        "installation" => {
            let wire: WireInstallationEvent = decode(body)?;
            let installation = Installation::from(wire.installation);
            let repositories = wire.repositories.into_iter().map(Into::into).collect();
            match wire.action.as_str() {
                "created" => Ok(WebhookEvent::InstallationCreated {
                    installation,
                    repositories,
                }),
                "deleted" => Ok(WebhookEvent::InstallationDeleted {
                    installation,
                    repositories,
                }),
                other => Ok(WebhookEvent::Ignored {
                    event_type: format!("installation.{other}"),
                }),
            }
        }
        "installation_repositories" => {
            let wire: WireInstallationRepositoriesEvent = decode(body)?;
            let installation = Installation::from(wire.installation);
            match wire.action.as_str() {
                "added" => Ok(WebhookEvent::InstallationReposAdded {
                    installation,
                    repositories: wire.repositories_added.into_iter().map(Into::into).collect(),
                }),
                "removed" => Ok(WebhookEvent::InstallationReposRemoved {
                    installation,
                    repositories: wire
                        .repositories_removed
                        .into_iter()
                        .map(Into::into)
                        .collect(),
                }),
                other => Ok(WebhookEvent::Ignored {
                    event_type: format!("installation_repositories.{other}"),
                }),
            }
        }
        "pull_request" => {
            let wire: WirePullRequestEvent = decode(body)?;
            Ok(WebhookEvent::PullRequest(PullRequestEvent {
                action: wire.action,
                installation_id: wire.installation.id,
                repository: wire.repository.into(),
                number: wire.pull_request.number,
                draft: wire.pull_request.draft,
                head_branch: wire.pull_request.head.branch,
                head_sha: wire.pull_request.head.sha,
            }))
        }
        "push" => {
            let wire: WirePushEvent = decode(body)?;
            Ok(WebhookEvent::Push(PushEvent {
                installation_id: wire.installation.id,
                repository: wire.repository.into(),
                git_ref: wire.git_ref,
            }))
        }
        other => Ok(WebhookEvent::Ignored {
            event_type: other.to_string(),
        }),
    }
}
