use serde::{Deserialize, Serialize};

use crate::issue::{IssueDetail, IssueKind, IssuePackage};
use crate::state::MachineState;

/// Per-state resource limits. A state exceeding one of them is broken.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionLimits {
    /// Instructions executed, operating system code included.
    pub max_steps: Option<u64>,

    /// Words written to the display.
    pub max_output: Option<usize>,

    /// Solver queries issued.
    pub max_queries: Option<u64>,
}

impl ExecutionLimits {
    /// Break `state` if it is over a limit. Returns true if it was.
    pub fn check(&self, state: &mut MachineState, issues: &mut IssuePackage) -> bool {
        let exceeded = if let Some(max) = self.max_steps
            && state.step_count() > max
        {
            Some((IssueKind::StepLimitReached, max))
        } else if let Some(max) = self.max_output
            && state.output().len() > max
        {
            Some((IssueKind::OutputLimitReached, max as u64))
        } else if let Some(max) = self.max_queries
            && state.query_count() > max
        {
            Some((IssueKind::QueryLimitReached, max))
        } else {
            None
        };

        let Some((kind, limit)) = exceeded else {
            return false;
        };

        issues.raise(state, kind, None, IssueDetail::Limit(limit));
        debug_assert!(!state.is_normal(), "{kind} must break the state");
        true
    }
}
