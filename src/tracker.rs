//! Detection of flows that became terminal between two snapshots.

use std::collections::HashSet;

use crate::client::BackendTarget;
use crate::model::Flow;

/// Names of the flows already reported in a polling session.
///
/// The set only grows. A flow that shows up again with a different status
/// after being reported is ignored.
#[derive(Debug, Clone, Default)]
pub struct FlowTracker {
    reported: HashSet<String>,
}

impl FlowTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the flows of `flows` that are terminal for `target` and were
    /// not returned by an earlier call, in snapshot order.
    ///
    /// Each returned name is recorded before returning, so a name repeated
    /// within one snapshot is also yielded once.
    pub fn newly_terminal<'a>(&mut self, target: &BackendTarget, flows: &'a [Flow]) -> Vec<&'a Flow> {
        flows
            .iter()
            .filter(|flow| target.is_terminal(&flow.status))
            .filter(|flow| self.reported.insert(flow.name.clone()))
            .collect()
    }

    /// Number of distinct flows reported so far.
    pub fn reported_count(&self) -> usize {
        self.reported.len()
    }
}
