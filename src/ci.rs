//! GitHub Actions run context.
//!
//! Reads the variables and the event payload the Actions runner provides, and
//! derives the branch, commit, pull request and run name an upload is tagged
//! with.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::params::ValidationError;

/// What the CI environment knows about the current run.
#[derive(Debug, Clone, Default)]
pub struct CiContext {
    /// `GITHUB_REF`, e.g. `refs/heads/main`.
    pub git_ref: Option<String>,
    /// `GITHUB_SHA`.
    pub sha: Option<String>,
    /// `GITHUB_REPOSITORY`, in `owner/name` form.
    pub repository: Option<String>,
    /// `GITHUB_EVENT_NAME`, e.g. `push` or `pull_request`.
    pub event_name: Option<String>,
    /// Parsed contents of `GITHUB_EVENT_PATH`.
    pub event: Value,
}

impl CiContext {
    /// Reads the context from the environment.
    ///
    /// Missing variables and an unreadable event file leave the matching
    /// fields empty; nothing here is fatal on its own.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        let event = var("GITHUB_EVENT_PATH")
            .and_then(|path| read_event(Path::new(&path)))
            .unwrap_or(Value::Null);

        Self {
            git_ref: var("GITHUB_REF"),
            sha: var("GITHUB_SHA"),
            repository: var("GITHUB_REPOSITORY"),
            event_name: var("GITHUB_EVENT_NAME"),
            event,
        }
    }

    fn pull_request(&self) -> Option<&Value> {
        self.event.get("pull_request").filter(|pr| !pr.is_null())
    }

    /// Resolves the branch name.
    ///
    /// Priority: a non-blank explicit branch, then the pull request head ref,
    /// then the branch or tag name parsed from `GITHUB_REF`.
    ///
    /// # Errors
    ///
    /// Fails when a pull request payload has no head ref, or when the ref is
    /// missing or not of the `refs/heads/*` / `refs/tags/*` form.
    pub fn branch_name(&self, explicit: Option<&str>) -> Result<String, ValidationError> {
        if let Some(branch) = explicit.map(str::trim).filter(|b| !b.is_empty()) {
            return Ok(branch.to_string());
        }

        if let Some(pr) = self.pull_request() {
            return pr
                .pointer("/head/ref")
                .and_then(Value::as_str)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .ok_or(ValidationError::MissingPullRequestRef);
        }

        let git_ref = self.git_ref.as_deref().unwrap_or_default();
        parse_ref(git_ref).ok_or_else(|| ValidationError::InvalidRef(git_ref.to_string()))
    }

    /// Head commit of the pull request, if the run is for one.
    pub fn commit_sha(&self) -> Option<String> {
        self.pull_request()
            .and_then(|pr| pr.pointer("/head/sha"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn pull_request_id(&self) -> Option<String> {
        self.pull_request()
            .and_then(|pr| pr.get("number"))
            .and_then(|n| match n {
                Value::Number(n) => Some(n.to_string()),
                Value::String(s) => Some(s.clone()),
                _ => None,
            })
    }

    pub fn repo_owner(&self) -> Option<String> {
        self.repository
            .as_deref()
            .and_then(|r| r.split_once('/'))
            .map(|(owner, _)| owner.to_string())
    }

    pub fn repo_name(&self) -> Option<String> {
        self.repository
            .as_deref()
            .and_then(|r| r.split_once('/'))
            .map(|(_, name)| name.to_string())
    }

    /// A run name for when none is given: the pull request title, the head
    /// commit message of a push, or the commit sha.
    pub fn inferred_name(&self) -> Option<String> {
        let title = self
            .pull_request()
            .and_then(|pr| pr.get("title"))
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty());
        if let Some(title) = title {
            return Some(title.to_string());
        }

        if self.event_name.as_deref() == Some("push")
            && let Some(message) = self
                .event
                .pointer("/head_commit/message")
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
        {
            return Some(message.to_string());
        }

        self.sha.clone()
    }
}

fn read_event(path: &Path) -> Option<Value> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| debug!("Cannot read event payload {}: {}", path.display(), e))
        .ok()?;
    serde_json::from_str(&content)
        .map_err(|e| debug!("Cannot parse event payload {}: {}", path.display(), e))
        .ok()
}

static REF_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^refs/(heads|tags)/(.+)$").expect("valid ref pattern"));

/// Extracts the branch or tag name from a full git ref.
fn parse_ref(git_ref: &str) -> Option<String> {
    REF_PATTERN
        .captures(git_ref)
        .and_then(|c| c.get(2))
        .map(|m| m.as_str().to_string())
}
