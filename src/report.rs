//! Result rendering and CI outputs.
//!
//! All user-facing lines go through the [`Console`] trait, which mirrors the
//! five presentation classes the CI log uses: info, success, error, warning
//! and canceled. [`TerminalConsole`] colors them.

pub mod outputs;

use std::sync::Arc;
#[cfg(test)]
use std::sync::Mutex;

pub use outputs::{JobOutputs, publish_outputs, workflow_error_command};

use crate::model::{CancellationReason, Flow, FlowStatus};

/// Sink for user-facing result lines.
pub trait Console: Send + Sync {
    fn info(&self, msg: &str);
    fn success(&self, msg: &str);
    fn err(&self, msg: &str);
    fn warning(&self, msg: &str);
    fn canceled(&self, msg: &str);

    /// Prints an empty separator line.
    fn blank(&self) {
        self.info("");
    }
}

/// Writes colored lines to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConsole;

impl Console for TerminalConsole {
    fn info(&self, msg: &str) {
        println!("{}", console::style(msg).cyan());
    }

    fn success(&self, msg: &str) {
        println!("{}", console::style(msg).green());
    }

    fn err(&self, msg: &str) {
        println!("{}", console::style(msg).red());
    }

    fn warning(&self, msg: &str) {
        println!("{}", console::style(msg).yellow().bright());
    }

    fn canceled(&self, msg: &str) {
        println!("{}", console::style(msg).dim());
    }
}

/// Presentation class of a console line.
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Info,
    Success,
    Err,
    Warning,
    Canceled,
}

/// A console that keeps every line in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryConsole {
    lines: Mutex<Vec<(LineKind, String)>>,
}

#[cfg(test)]
impl MemoryConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded lines, in order.
    pub fn lines(&self) -> Vec<(LineKind, String)> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Recorded lines of one class.
    pub fn lines_of(&self, kind: LineKind) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, line)| line)
            .collect()
    }

    /// Returns `true` if any recorded line equals `line`.
    pub fn contains(&self, line: &str) -> bool {
        self.lines().iter().any(|(_, l)| l == line)
    }

    fn push(&self, kind: LineKind, msg: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((kind, msg.to_string()));
        }
    }
}

#[cfg(test)]
impl Console for MemoryConsole {
    fn info(&self, msg: &str) {
        self.push(LineKind::Info, msg);
    }

    fn success(&self, msg: &str) {
        self.push(LineKind::Success, msg);
    }

    fn err(&self, msg: &str) {
        self.push(LineKind::Err, msg);
    }

    fn warning(&self, msg: &str) {
        self.push(LineKind::Warning, msg);
    }

    fn canceled(&self, msg: &str) {
        self.push(LineKind::Canceled, msg);
    }
}

/// Label shown for a canceled flow.
pub fn canceled_label(reason: Option<&CancellationReason>) -> &'static str {
    match reason {
        Some(CancellationReason::BenchmarkDependencyFailed)
        | Some(CancellationReason::OverlappingBenchmark) => "Skipped",
        Some(CancellationReason::Timeout) => "Timeout",
        Some(CancellationReason::InfraError) | Some(CancellationReason::Unknown(_)) | None => {
            "Canceled"
        }
    }
}

fn flow_word(count: usize) -> &'static str {
    if count == 1 { "Flow" } else { "Flows" }
}

/// `"<failed>/<total> Flows Failed"`.
pub fn failed_flows_summary(flows: &[Flow]) -> String {
    let counts = FlowCounts::from_flows(flows);
    format!("{}/{} {} Failed", counts.failed, counts.total, flow_word(counts.total))
}

/// Per-status tallies over a flow list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowCounts {
    pub total: usize,
    /// Successful flows, warnings included.
    pub passed: usize,
    pub failed: usize,
    pub canceled: usize,
    pub stopped: usize,
}

impl FlowCounts {
    pub fn from_flows(flows: &[Flow]) -> Self {
        let mut counts = FlowCounts {
            total: flows.len(),
            ..Default::default()
        };
        for flow in flows {
            match &flow.status {
                FlowStatus::Success | FlowStatus::Warning => counts.passed += 1,
                FlowStatus::Error => counts.failed += 1,
                FlowStatus::Canceled => counts.canceled += 1,
                FlowStatus::Stopped => counts.stopped += 1,
                FlowStatus::Pending | FlowStatus::Running | FlowStatus::Unknown(_) => {}
            }
        }
        counts
    }
}

/// Renders flow and upload results on a [`Console`].
#[derive(Clone)]
pub struct ResultReporter {
    console: Arc<dyn Console>,
}

impl ResultReporter {
    pub fn new(console: Arc<dyn Console>) -> Self {
        Self { console }
    }

    pub fn console(&self) -> &Arc<dyn Console> {
        &self.console
    }

    /// Prints the line for one terminal flow. Non-terminal flows print nothing.
    pub fn report_flow(&self, flow: &Flow) {
        match &flow.status {
            FlowStatus::Success => self.console.success(&format!("[Passed] {}", flow.name)),
            FlowStatus::Error => {
                let detail = flow
                    .first_error()
                    .map(|e| format!(" ({})", e))
                    .unwrap_or_default();
                self.console.err(&format!("[Failed] {}{}", flow.name, detail));
            }
            FlowStatus::Warning => self.console.warning(&format!("[Warning] {}", flow.name)),
            FlowStatus::Canceled => self.console.canceled(&format!(
                "[{}] {}",
                canceled_label(flow.cancellation_reason.as_ref()),
                flow.name
            )),
            FlowStatus::Stopped => self.console.canceled(&format!("[Stopped] {}", flow.name)),
            FlowStatus::Pending | FlowStatus::Running | FlowStatus::Unknown(_) => {}
        }
    }

    /// Prints the aggregate result of a completed upload.
    pub fn report_upload_result(&self, status: &FlowStatus, flows: &[Flow]) {
        if status.is_failure() {
            self.console.err(&failed_flows_summary(flows));
            return;
        }

        let counts = FlowCounts::from_flows(flows);
        let word = flow_word(counts.total);

        if counts.passed == 0 {
            self.console.canceled("Upload Canceled");
            return;
        }

        self.console
            .success(&format!("{}/{} {} Passed", counts.passed, counts.total, word));
        if counts.canceled > 0 {
            self.console
                .canceled(&format!("{}/{} {} Canceled", counts.canceled, counts.total, word));
        }
        if counts.stopped > 0 {
            self.console
                .canceled(&format!("{}/{} {} Stopped", counts.stopped, counts.total, word));
        }
    }

    /// Prints the summary block shown once an upload completes.
    pub fn report_completion(&self, status: &FlowStatus, flows: &[Flow], console_url: &str) {
        self.console.blank();
        self.report_upload_result(status, flows);
        self.console.blank();
        self.console.info("==== View details in the console ====\n");
        self.console.info(console_url);
    }
}
