//! Structured job outputs for the CI caller.
//!
//! On GitHub Actions, outputs are appended to the file named by
//! `$GITHUB_OUTPUT` using the `name<<DELIMITER` form, which allows multi-line
//! values such as the flow result JSON. Outside of Actions they are logged.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::client::BackendTarget;
use crate::model::{Flow, FlowStatus, UploadJob};

/// Output name of the overall upload status.
pub const UPLOAD_STATUS_OUTPUT: &str = "MAESTRO_CLOUD_UPLOAD_STATUS";

/// Output name of the flow result list.
pub const FLOW_RESULTS_OUTPUT: &str = "MAESTRO_CLOUD_FLOW_RESULTS";

/// Ordered name/value pairs to hand to the CI runner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOutputs {
    entries: Vec<(String, String)>,
}

impl JobOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outputs published right after an upload is accepted.
    pub fn for_upload(target: &BackendTarget, job: &UploadJob) -> Self {
        Self::new()
            .with(target.console_url_output(), &job.console_url)
            .with(target.app_binary_id_output(), &job.app_binary_id)
    }

    /// Outputs published once an upload completes.
    pub fn for_completion(status: &FlowStatus, flows: &[Flow]) -> serde_json::Result<Self> {
        Ok(Self::new()
            .with(UPLOAD_STATUS_OUTPUT, status.as_str())
            .with(FLOW_RESULTS_OUTPUT, serde_json::to_string(flows)?))
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.push((name.into(), value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Appends the outputs to a GitHub Actions output file.
    pub fn append_to(&self, path: &Path) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        for (name, value) in self.iter() {
            let delimiter = delimiter_for(value);
            writeln!(file, "{}<<{}", name, delimiter)?;
            writeln!(file, "{}", value)?;
            writeln!(file, "{}", delimiter)?;
        }
        Ok(())
    }
}

/// Publishes outputs to `$GITHUB_OUTPUT` when set, otherwise logs them.
pub fn publish_outputs(outputs: &JobOutputs) -> std::io::Result<()> {
    match std::env::var_os("GITHUB_OUTPUT") {
        Some(path) if !path.is_empty() => outputs.append_to(Path::new(&path)),
        _ => {
            for (name, value) in outputs.iter() {
                info!(output = name, "{}", value);
            }
            Ok(())
        }
    }
}

/// Formats an `::error::` workflow command for a failure message.
pub fn workflow_error_command(message: &str) -> String {
    let escaped = message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A");
    format!("::error::{}", escaped)
}

fn delimiter_for(value: &str) -> String {
    let mut delimiter = String::from("MAESTRO_UPLOAD_EOF");
    while value.contains(&delimiter) {
        delimiter.push('_');
    }
    delimiter
}
