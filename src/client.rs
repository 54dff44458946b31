//! HTTP client for the upload and status endpoints.
//!
//! Two backend shapes exist. They differ in endpoint paths, in the JSON schema
//! of the upload request and response, and in which flow statuses are
//! terminal. The polling contract is identical. The shape is chosen once, when
//! the [`ApiClient`] is built, through [`BackendTarget`].
//!
//! ```text
//!                 Cloud                                   Project
//! upload   POST {api}/v2/upload                   POST {api}/runMaestroTest
//! status   GET  {api}/v2/upload/{id}/status       GET  {api}/upload/{id}
//!                  ?includeErrors=true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::{FlowStatus, StatusSnapshot, UploadJob, UploadRequest};

/// Default base URL of the upload API.
pub const DEFAULT_API_URL: &str = "https://api.mobile.dev";

/// Default web console for cloud uploads.
pub const DEFAULT_CLOUD_CONSOLE_URL: &str = "https://console.mobile.dev";

/// Default web console for project uploads.
pub const DEFAULT_PROJECT_CONSOLE_URL: &str = "https://copilot.mobile.dev";

const STATUS_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors returned by the upload and status endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The upload endpoint answered with a non-success status.
    #[error("Request to {url} failed ({status}): {body}")]
    Transport {
        url: String,
        status: u16,
        body: String,
    },

    /// The status endpoint answered with a non-success status.
    ///
    /// The poller decides whether this is retried, see
    /// [`StatusPoller`](crate::poller::StatusPoller).
    #[error("Request to {url} failed ({status}): {body}")]
    StatusQuery {
        url: String,
        status: u16,
        body: String,
    },

    /// Connection, DNS, TLS or body decoding failure.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A file part could not be read from disk.
    #[error("Failed to read {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A request or response body was not valid JSON for the backend.
    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// The backend a client talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendTarget {
    /// The cloud upload service, keyed by team.
    Cloud { console_url: String },

    /// The project-scoped service, selected by a project id.
    Project {
        project_id: String,
        console_url: String,
    },
}

impl BackendTarget {
    /// Cloud backend with the default console.
    pub fn cloud() -> Self {
        BackendTarget::Cloud {
            console_url: DEFAULT_CLOUD_CONSOLE_URL.to_string(),
        }
    }

    /// Project backend with the default console.
    pub fn project(project_id: impl Into<String>) -> Self {
        BackendTarget::Project {
            project_id: project_id.into(),
            console_url: DEFAULT_PROJECT_CONSOLE_URL.to_string(),
        }
    }

    /// Picks the backend from an optional project id.
    ///
    /// A blank project id counts as absent.
    pub fn from_project_id(project_id: Option<&str>) -> Self {
        match project_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => Self::project(id),
            None => Self::cloud(),
        }
    }

    /// Replaces the console base URL used to build job links.
    pub fn with_console_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into().trim_end_matches('/').to_string();
        match &mut self {
            BackendTarget::Cloud { console_url } | BackendTarget::Project { console_url, .. } => {
                *console_url = url
            }
        }
        self
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            BackendTarget::Cloud { .. } => "cloud",
            BackendTarget::Project { .. } => "project",
        }
    }

    /// Path of the upload endpoint, relative to the API URL.
    pub fn upload_path(&self) -> &'static str {
        match self {
            BackendTarget::Cloud { .. } => "/v2/upload",
            BackendTarget::Project { .. } => "/runMaestroTest",
        }
    }

    /// Path of the status endpoint for an upload, relative to the API URL.
    pub fn status_path(&self, upload_id: &str) -> String {
        match self {
            BackendTarget::Cloud { .. } => {
                format!("/v2/upload/{}/status?includeErrors=true", upload_id)
            }
            BackendTarget::Project { .. } => format!("/upload/{}", upload_id),
        }
    }

    /// Returns `true` if a flow in `status` will not change any more.
    pub fn is_terminal(&self, status: &FlowStatus) -> bool {
        match self {
            BackendTarget::Cloud { .. } => matches!(
                status,
                FlowStatus::Success | FlowStatus::Error | FlowStatus::Warning | FlowStatus::Canceled
            ),
            BackendTarget::Project { .. } => matches!(
                status,
                FlowStatus::Success | FlowStatus::Error | FlowStatus::Stopped
            ),
        }
    }

    /// Output name under which the console URL is published.
    pub fn console_url_output(&self) -> &'static str {
        match self {
            BackendTarget::Cloud { .. } => "MAESTRO_CLOUD_CONSOLE_URL",
            BackendTarget::Project { .. } => "ROBIN_CONSOLE_URL",
        }
    }

    /// Output name under which the app binary id is published.
    pub fn app_binary_id_output(&self) -> &'static str {
        match self {
            BackendTarget::Cloud { .. } => "MAESTRO_CLOUD_APP_BINARY_ID",
            BackendTarget::Project { .. } => "ROBIN_APP_BINARY_ID",
        }
    }

    /// Serializes the `request` form field for this backend.
    pub fn request_json(&self, request: &UploadRequest) -> serde_json::Result<String> {
        match self {
            BackendTarget::Cloud { .. } => serde_json::to_string(request),
            BackendTarget::Project { project_id, .. } => {
                serde_json::to_string(&ProjectUploadRequest::new(request, project_id))
            }
        }
    }

    /// Parses the upload response body into a job handle.
    pub fn parse_upload_response(&self, body: &str) -> serde_json::Result<UploadJob> {
        match self {
            BackendTarget::Cloud { console_url } => {
                let response: CloudUploadResponse = serde_json::from_str(body)?;
                Ok(UploadJob {
                    console_url: format!(
                        "{}/uploads/{}?teamId={}&appId={}",
                        console_url,
                        response.upload_id,
                        response.team_id,
                        response.app_binary_id
                    ),
                    upload_id: response.upload_id,
                    app_binary_id: response.app_binary_id,
                })
            }
            BackendTarget::Project {
                project_id,
                console_url,
            } => {
                let response: ProjectUploadResponse = serde_json::from_str(body)?;
                Ok(UploadJob {
                    console_url: format!(
                        "{}/project/{}/maestro-test/app/{}/upload/{}",
                        console_url, project_id, response.app_id, response.upload_id
                    ),
                    upload_id: response.upload_id,
                    app_binary_id: response.app_binary_id,
                })
            }
        }
    }
}

/// Upload request schema of the project backend.
///
/// Carries no benchmark name, repository or agent; adds the project id.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectUploadRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    commit_sha: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pull_request_id: Option<&'a str>,
    #[serde(skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    env: &'a std::collections::BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    android_api_level: Option<u32>,
    #[serde(rename = "iOSVersion", skip_serializing_if = "Option::is_none")]
    ios_version: Option<u32>,
    include_tags: &'a [String],
    exclude_tags: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    app_binary_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_locale: Option<&'a str>,
    project_id: &'a str,
}

impl<'a> ProjectUploadRequest<'a> {
    fn new(request: &'a UploadRequest, project_id: &'a str) -> Self {
        Self {
            branch: request.branch.as_deref(),
            commit_sha: request.commit_sha.as_deref(),
            pull_request_id: request.pull_request_id.as_deref(),
            env: &request.env,
            android_api_level: request.android_api_level,
            ios_version: request.ios_version,
            include_tags: &request.include_tags,
            exclude_tags: &request.exclude_tags,
            app_binary_id: request.app_binary_id.as_deref().filter(|id| !id.is_empty()),
            device_locale: request.device_locale.as_deref().filter(|l| !l.is_empty()),
            project_id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloudUploadResponse {
    upload_id: String,
    team_id: String,
    app_binary_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectUploadResponse {
    upload_id: String,
    app_id: String,
    app_binary_id: String,
}

/// Anything that can produce status snapshots for an upload.
///
/// [`ApiClient`] is the production implementation; the poller only depends
/// on this trait.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// The backend whose terminal statuses apply to the snapshots.
    fn target(&self) -> &BackendTarget;

    /// Fetches the current snapshot of an upload.
    async fn fetch_status(&self, upload_id: &str) -> ApiResult<StatusSnapshot>;
}

/// Client for the upload service.
///
/// Holds no per-upload state; one client can serve any number of uploads.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_key: String,
    api_url: String,
    target: BackendTarget,
}

impl ApiClient {
    /// Creates a client for the given API and backend.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Network`] if the HTTP client cannot be initialized
    /// (for example when no TLS backend is available).
    pub fn new(
        api_key: impl Into<String>,
        api_url: impl Into<String>,
        target: BackendTarget,
    ) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("maestro-upload/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            target,
        })
    }

    pub fn target(&self) -> &BackendTarget {
        &self.target
    }

    /// Submits an upload.
    ///
    /// The request metadata goes into the `request` form field. Each file is
    /// attached only when its path is given: `app_binary`, `workspace` and
    /// `mapping`. Uploads are never retried.
    ///
    /// # Errors
    ///
    /// - [`ApiError::ReadFile`] if a file part cannot be read; nothing is sent.
    /// - [`ApiError::Transport`] if the server answers with a non-2xx status.
    /// - [`ApiError::Network`] on connection failures.
    /// - [`ApiError::Json`] if the response does not match the backend schema.
    pub async fn upload(
        &self,
        request: &UploadRequest,
        app_file: Option<&Path>,
        workspace_zip: Option<&Path>,
        mapping_file: Option<&Path>,
    ) -> ApiResult<UploadJob> {
        let mut form = Form::new().text("request", self.target.request_json(request)?);

        for (field, path) in [
            ("app_binary", app_file),
            ("workspace", workspace_zip),
            ("mapping", mapping_file),
        ] {
            if let Some(path) = path {
                form = form.part(field, file_part(path).await?);
            }
        }

        let url = format!("{}{}", self.api_url, self.target.upload_path());
        info!(backend = self.target.name(), "Uploading to {}", url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Transport {
                url,
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let job = self.target.parse_upload_response(&body)?;
        debug!(upload_id = %job.upload_id, "Upload accepted");
        Ok(job)
    }

    /// Fetches the current status of an upload.
    ///
    /// # Errors
    ///
    /// - [`ApiError::StatusQuery`] if the server answers with a non-2xx status.
    /// - [`ApiError::Network`] on connection or decoding failures.
    pub async fn get_status(&self, upload_id: &str) -> ApiResult<StatusSnapshot> {
        let url = format!("{}{}", self.api_url, self.target.status_path(upload_id));

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .timeout(STATUS_REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::StatusQuery {
                url,
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<StatusSnapshot>().await?)
    }
}

#[async_trait]
impl StatusSource for ApiClient {
    fn target(&self) -> &BackendTarget {
        &self.target
    }

    async fn fetch_status(&self, upload_id: &str) -> ApiResult<StatusSnapshot> {
        self.get_status(upload_id).await
    }
}

async fn file_part(path: &Path) -> ApiResult<Part> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| ApiError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.bin".to_string());

    Ok(Part::bytes(bytes).file_name(file_name))
}
