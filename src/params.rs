//! Parameter validation and upload request construction.
//!
//! Everything here runs before any network call. A [`ValidationError`] means
//! the run fails without contacting the service.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::ci::CiContext;
use crate::model::UploadRequest;

/// Agent string sent with every upload.
pub const AGENT: &str = "github";

/// Malformed local input.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid env parameter: {0}")]
    InvalidEnv(String),

    #[error("Invalid tag list: {0}")]
    InvalidTags(String),

    #[error("File does not exist: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("Unsupported file format: {}", .0.display())]
    UnsupportedAppFile(PathBuf),

    #[error("Workspace directory does not exist: {}", .0.display())]
    MissingWorkspace(PathBuf),

    #[error("Default workspace directory does not exist: .maestro/")]
    NoDefaultWorkspace,

    #[error("Failed to parse GitHub ref: {0}")]
    InvalidRef(String),

    #[error("Unable find pull request ref")]
    MissingPullRequestRef,

    #[error("Either an app file or an app binary id is required")]
    MissingApp,
}

/// Splits a comma-separated tag list.
///
/// An empty or absent list yields no tags. Entries are trimmed.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidTags`] when an entry is empty, as in
/// `smoke,,login`.
pub fn parse_tags(input: Option<&str>) -> Result<Vec<String>, ValidationError> {
    let input = match input.map(str::trim) {
        None | Some("") => return Ok(Vec::new()),
        Some(input) => input,
    };

    input
        .split(',')
        .map(str::trim)
        .map(|tag| {
            if tag.is_empty() {
                Err(ValidationError::InvalidTags(input.to_string()))
            } else {
                Ok(tag.to_string())
            }
        })
        .collect()
}

/// Parses `KEY=VALUE` entries. Values may themselves contain `=`.
///
/// Blank entries are skipped; later duplicates override earlier ones.
pub fn parse_env<S: AsRef<str>>(entries: &[S]) -> Result<BTreeMap<String, String>, ValidationError> {
    let mut env = BTreeMap::new();
    for entry in entries.iter().map(AsRef::as_ref) {
        if entry.trim().is_empty() {
            continue;
        }
        match entry.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                env.insert(key.trim().to_string(), value.to_string());
            }
            _ => return Err(ValidationError::InvalidEnv(entry.to_string())),
        }
    }
    Ok(env)
}

/// Resolves a user-supplied path.
///
/// `~` is expanded, and relative paths are taken relative to `root` (the
/// Actions workspace) when given.
pub fn resolve_path(path: &str, root: Option<&Path>) -> PathBuf {
    let expanded = PathBuf::from(shellexpand::tilde(path).into_owned());
    match root {
        Some(root) if expanded.is_relative() => root.join(expanded),
        _ => expanded,
    }
}

/// Resolves a path and checks that it exists.
pub fn existing_path(path: &str, root: Option<&Path>) -> Result<PathBuf, ValidationError> {
    let resolved = resolve_path(path, root);
    if resolved.exists() {
        Ok(resolved)
    } else {
        Err(ValidationError::MissingFile(resolved))
    }
}

/// Request fields that come from the user rather than from CI.
#[derive(Debug, Clone, Default)]
pub struct RequestInputs {
    pub name: Option<String>,
    pub branch: Option<String>,
    pub env: Vec<String>,
    pub include_tags: Option<String>,
    pub exclude_tags: Option<String>,
    pub android_api_level: Option<u32>,
    pub ios_version: Option<u32>,
    pub app_binary_id: Option<String>,
    pub device_locale: Option<String>,
}

/// Builds the upload request from user inputs and the CI context.
pub fn build_request(inputs: &RequestInputs, ctx: &CiContext) -> Result<UploadRequest, ValidationError> {
    let non_blank = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    Ok(UploadRequest {
        benchmark_name: non_blank(&inputs.name).or_else(|| ctx.inferred_name()),
        repo_owner: ctx.repo_owner(),
        repo_name: ctx.repo_name(),
        pull_request_id: ctx.pull_request_id(),
        branch: Some(ctx.branch_name(inputs.branch.as_deref())?),
        commit_sha: ctx.commit_sha(),
        env: parse_env(&inputs.env)?,
        agent: AGENT.to_string(),
        android_api_level: inputs.android_api_level,
        ios_version: inputs.ios_version,
        include_tags: parse_tags(inputs.include_tags.as_deref())?,
        exclude_tags: parse_tags(inputs.exclude_tags.as_deref())?,
        app_binary_id: non_blank(&inputs.app_binary_id),
        device_locale: non_blank(&inputs.device_locale),
    })
}
