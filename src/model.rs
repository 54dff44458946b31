//! Wire and domain types shared by the upload client, the poller and the
//! reporter.
//!
//! Status and cancellation values are deserialized leniently: values this
//! client does not know about are kept verbatim in an `Unknown` variant
//! instead of failing the whole snapshot, and serialize back unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Status of a flow, or of an upload as a whole.
///
/// Both backend variants share this value space. Which values are terminal
/// depends on the backend, see [`BackendTarget::is_terminal`](crate::client::BackendTarget::is_terminal).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FlowStatus {
    Pending,
    Running,
    Success,
    Error,
    Canceled,
    Warning,
    Stopped,
    /// A value this client does not know, as sent by the service.
    Unknown(String),
}

impl FlowStatus {
    /// The wire spelling of this status.
    pub fn as_str(&self) -> &str {
        match self {
            FlowStatus::Pending => "PENDING",
            FlowStatus::Running => "RUNNING",
            FlowStatus::Success => "SUCCESS",
            FlowStatus::Error => "ERROR",
            FlowStatus::Canceled => "CANCELED",
            FlowStatus::Warning => "WARNING",
            FlowStatus::Stopped => "STOPPED",
            FlowStatus::Unknown(raw) => raw,
        }
    }

    /// Returns `true` for the overall status that fails a CI run.
    pub fn is_failure(&self) -> bool {
        matches!(self, FlowStatus::Error)
    }
}

impl From<String> for FlowStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "PENDING" => FlowStatus::Pending,
            "RUNNING" => FlowStatus::Running,
            "SUCCESS" => FlowStatus::Success,
            "ERROR" => FlowStatus::Error,
            "CANCELED" => FlowStatus::Canceled,
            "WARNING" => FlowStatus::Warning,
            "STOPPED" => FlowStatus::Stopped,
            _ => FlowStatus::Unknown(raw),
        }
    }
}

impl From<FlowStatus> for String {
    fn from(status: FlowStatus) -> Self {
        match status {
            FlowStatus::Unknown(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the service canceled a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CancellationReason {
    BenchmarkDependencyFailed,
    InfraError,
    OverlappingBenchmark,
    Timeout,
    Unknown(String),
}

impl CancellationReason {
    pub fn as_str(&self) -> &str {
        match self {
            CancellationReason::BenchmarkDependencyFailed => "BENCHMARK_DEPENDENCY_FAILED",
            CancellationReason::InfraError => "INFRA_ERROR",
            CancellationReason::OverlappingBenchmark => "OVERLAPPING_BENCHMARK",
            CancellationReason::Timeout => "TIMEOUT",
            CancellationReason::Unknown(raw) => raw,
        }
    }
}

impl From<String> for CancellationReason {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "BENCHMARK_DEPENDENCY_FAILED" => CancellationReason::BenchmarkDependencyFailed,
            "INFRA_ERROR" => CancellationReason::InfraError,
            "OVERLAPPING_BENCHMARK" => CancellationReason::OverlappingBenchmark,
            "TIMEOUT" => CancellationReason::Timeout,
            _ => CancellationReason::Unknown(raw),
        }
    }
}

impl From<CancellationReason> for String {
    fn from(reason: CancellationReason) -> Self {
        match reason {
            CancellationReason::Unknown(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

/// One test item within an upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    /// Flow name, unique within an upload.
    pub name: String,
    pub status: FlowStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<CancellationReason>,
}

impl Flow {
    /// Creates a flow with no errors and no cancellation reason.
    pub fn new(name: impl Into<String>, status: FlowStatus) -> Self {
        Self {
            name: name.into(),
            status,
            errors: None,
            cancellation_reason: None,
        }
    }

    /// First error message reported for this flow, if any.
    pub fn first_error(&self) -> Option<&str> {
        self.errors
            .as_ref()
            .and_then(|errors| errors.first())
            .map(String::as_str)
    }
}

/// The state of an upload as returned by one status query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub upload_id: String,
    pub status: FlowStatus,
    pub completed: bool,
    #[serde(default)]
    pub flows: Vec<Flow>,
}

/// Parameters for a single submission.
///
/// Built once by the parameter layer and consumed by
/// [`ApiClient::upload`](crate::client::ApiClient::upload). The JSON field
/// names are the ones the cloud upload endpoint expects.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub benchmark_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    pub agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub android_api_level: Option<u32>,
    #[serde(rename = "iOSVersion", skip_serializing_if = "Option::is_none")]
    pub ios_version: Option<u32>,
    pub include_tags: Vec<String>,
    pub exclude_tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_binary_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_locale: Option<String>,
}

/// Handle to a job accepted by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadJob {
    pub upload_id: String,
    /// Human-readable page for the job in the web console.
    pub console_url: String,
    pub app_binary_id: String,
}
