//! Inbound repository events.
//!
//! Two upstream events matter: a pull request closing (which may carry a
//! changelog) and a push to the target branch (which may carry part files
//! written by someone else). Everything else is ignored.

use changelog_shared::{CategorySet, ChangelogError, Result, Submission};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, trace};

use crate::coordinator::CoordinatorHandle;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestEvent {
    pub action: String,
    pub pull_request: PullRequest,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub body: Option<String>,
    pub user: User,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
    pub base: BaseRef,
    pub html_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BaseRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub ref_name: String,
    #[serde(default)]
    pub commits: Vec<PushedCommit>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushedCommit {
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
}

impl PullRequest {
    fn into_submission(self) -> Submission {
        Submission {
            body: self.body.unwrap_or_default(),
            author_login: self.user.login,
            merged_at: self.merged_at,
            number: self.number,
            html_url: self.html_url,
        }
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// What the router did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A changelog was parsed and handed to the coordinator.
    Submitted { pr: u64, entries: usize },
    /// A merged pull request without a changelog marker.
    NoChangelog,
    /// A push touched part files; an update was requested.
    UpdateRequested,
    /// Not relevant; the reason is for logs.
    Ignored(&'static str),
}

/// Matches part files under `parts_dir`, relative to the repository root.
pub fn parts_file_pattern(parts_dir: &str) -> Result<Regex> {
    let dir = parts_dir.trim_end_matches('/');
    Regex::new(&format!(r"^{}/.*\.yml$", regex::escape(dir)))
        .map_err(|e| ChangelogError::config(format!("invalid parts_dir pattern: {e}")))
}

/// Turns decoded events into coordinator messages.
#[derive(Debug, Clone)]
pub struct EventRouter {
    handle: CoordinatorHandle,
    categories: CategorySet,
    branch: String,
    parts_pattern: Regex,
}

impl EventRouter {
    pub fn new(
        handle: CoordinatorHandle,
        categories: CategorySet,
        branch: impl Into<String>,
        parts_pattern: Regex,
    ) -> Self {
        Self {
            handle,
            categories,
            branch: branch.into(),
            parts_pattern,
        }
    }

    /// Decode a raw event body and route it by event name.
    pub fn dispatch(&self, event: &str, payload: &[u8]) -> Result<RouteOutcome> {
        match event {
            "pull_request" => Ok(self.handle_pull_request(decode(event, payload)?)),
            "push" => Ok(self.handle_push(&decode(event, payload)?)),
            _ => {
                trace!(event, "ignoring event");
                Ok(RouteOutcome::Ignored("unhandled event type"))
            }
        }
    }

    /// Route an already-parsed JSON payload.
    pub fn route(&self, event: &str, payload: serde_json::Value) -> Result<RouteOutcome> {
        match event {
            "pull_request" => Ok(self.handle_pull_request(from_value(event, payload)?)),
            "push" => Ok(self.handle_push(&from_value(event, payload)?)),
            _ => {
                trace!(event, "ignoring event");
                Ok(RouteOutcome::Ignored("unhandled event type"))
            }
        }
    }

    pub fn handle_pull_request(&self, event: PullRequestEvent) -> RouteOutcome {
        let pr = &event.pull_request;
        if event.action != "closed" {
            trace!(pr = pr.number, action = %event.action, "pull request not closed");
            return RouteOutcome::Ignored("pull request not closed");
        }
        if !pr.merged {
            trace!(pr = pr.number, "pull request closed without merging");
            return RouteOutcome::Ignored("pull request not merged");
        }
        if pr.base.ref_name != self.branch {
            trace!(pr = pr.number, base = %pr.base.ref_name, "pull request merged into another branch");
            return RouteOutcome::Ignored("pull request targets another branch");
        }

        let submission = event.pull_request.into_submission();
        let Some(result) = changelog_grammar::parse(&submission, &self.categories) else {
            debug!(pr = submission.number, "merged without a changelog");
            return RouteOutcome::NoChangelog;
        };

        let entries = result.entry_count();
        info!(pr = result.number, author = %result.author, entries, "changelog accepted");
        self.handle.submit(result);

        RouteOutcome::Submitted {
            pr: submission.number,
            entries,
        }
    }

    pub fn handle_push(&self, event: &PushEvent) -> RouteOutcome {
        if event.ref_name != format!("refs/heads/{}", self.branch) {
            trace!(git_ref = %event.ref_name, "push to another branch");
            return RouteOutcome::Ignored("push to another branch");
        }

        let touches_parts = event
            .commits
            .iter()
            .flat_map(|c| c.added.iter().chain(&c.modified))
            .any(|path| self.parts_pattern.is_match(path));

        if !touches_parts {
            trace!("push did not touch changelog parts");
            return RouteOutcome::Ignored("no changelog parts changed");
        }

        info!("push touched changelog parts, requesting update");
        self.handle.request_update();
        RouteOutcome::UpdateRequested
    }
}

fn decode<T: serde::de::DeserializeOwned>(event: &str, payload: &[u8]) -> Result<T> {
    serde_json::from_slice(payload)
        .map_err(|e| ChangelogError::Serialization(format!("bad {event} payload: {e}")))
}

fn from_value<T: serde::de::DeserializeOwned>(
    event: &str,
    payload: serde_json::Value,
) -> Result<T> {
    serde_json::from_value(payload)
        .map_err(|e| ChangelogError::Serialization(format!("bad {event} payload: {e}")))
}
