use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::addr::TaskAddr;
use crate::drift::Changes;
use crate::error::ProvisionerError;
use crate::lifecycle::Lifecycle;

/// Where a task is in its reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    /// Not yet admitted. Tasks whose dependencies never succeed stay here.
    Pending,
    Discovering,
    Validating,
    Rendering,
    /// Live state already matched.
    NoOp,
    /// Diverged, but the lifecycle forbids mutation.
    SkippedByPolicy,
    Done,
    /// Desired state was rejected before any mutation.
    Error,
    /// A cloud call, wait or discovery failed.
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::NoOp | Self::SkippedByPolicy | Self::Done | Self::Error | Self::Failed
        )
    }

    /// Dependents may be admitted once a dependency reaches this state.
    pub fn unblocks_dependents(self) -> bool {
        matches!(self, Self::NoOp | Self::SkippedByPolicy | Self::Done)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Discovering => "discovering",
            Self::Validating => "validating",
            Self::Rendering => "rendering",
            Self::NoOp => "no-op",
            Self::SkippedByPolicy => "skipped-by-policy",
            Self::Done => "done",
            Self::Error => "error",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// How one task ended up.
#[derive(Debug)]
pub struct TaskOutcome {
    pub addr: TaskAddr,
    pub lifecycle: Lifecycle,
    pub state: TaskState,
    /// Changes computed against live state. Empty if never discovered.
    pub changes: Changes,
    pub identifier: Option<String>,
    pub error: Option<ProvisionerError>,
}

impl TaskOutcome {
    pub(crate) fn pending(addr: TaskAddr, lifecycle: Lifecycle) -> Self {
        Self {
            addr,
            lifecycle,
            state: TaskState::Pending,
            changes: Changes::default(),
            identifier: None,
            error: None,
        }
    }
}

/// Per-task outcomes of one engine run, in execution order.
#[derive(Debug)]
pub struct RunReport {
    pub outcomes: Vec<TaskOutcome>,
    /// Task whose failure stopped further admissions.
    pub halted_by: Option<TaskAddr>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn outcome(&self, addr: &TaskAddr) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| &o.addr == addr)
    }

    pub fn state(&self, addr: &TaskAddr) -> Option<TaskState> {
        self.outcome(addr).map(|o| o.state)
    }

    pub fn count(&self, state: TaskState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }

    /// Every task converged or was deliberately left alone.
    pub fn is_success(&self) -> bool {
        self.halted_by.is_none() && self.outcomes.iter().all(|o| o.state.unblocks_dependents())
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.outcomes.iter().filter(|o| o.error.is_some())
    }

    /// The report if the run succeeded, otherwise the error that halted it
    /// (or the first task error).
    pub fn into_result(mut self) -> Result<Self, ProvisionerError> {
        if self.is_success() {
            return Ok(self);
        }

        let halted = self.halted_by.clone();
        let position = self
            .outcomes
            .iter()
            .position(|o| halted.as_ref() == Some(&o.addr) && o.error.is_some())
            .or_else(|| self.outcomes.iter().position(|o| o.error.is_some()));

        match position.and_then(|i| self.outcomes[i].error.take()) {
            Some(err) => Err(err),
            None => {
                let stuck: Vec<String> = self
                    .outcomes
                    .iter()
                    .filter(|o| !o.state.unblocks_dependents())
                    .map(|o| format!("{} ({})", o.addr, o.state))
                    .collect();
                Err(ProvisionerError::Config(format!(
                    "run did not converge: {}",
                    stuck.join(", ")
                )))
            }
        }
    }
}
