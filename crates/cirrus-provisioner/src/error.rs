use std::time::Duration;

use cirrus_cloud::CloudError;
use thiserror::Error;

use crate::addr::TaskAddr;

#[derive(Debug, Error)]
pub enum ProvisionerError {
    #[error("field {field} is required")]
    RequiredField { field: &'static str },

    #[error("cannot change field(s): {}", fields.join(", "))]
    CannotChangeField { fields: Vec<String> },

    #[error("missing target: a gateway or a NAT gateway is required")]
    MissingTarget,

    #[error("ambiguous target: cannot set more than one of gateway and NAT gateway")]
    AmbiguousTarget,

    #[error("found {count} live objects matching {addr}; refusing to reconcile ambiguous state")]
    AmbiguousLiveState { addr: TaskAddr, count: usize },

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error("timed out after {waited:?} waiting for {dependency} to become {wanted}")]
    DependencyTimeout {
        dependency: String,
        wanted: &'static str,
        waited: Duration,
    },

    #[error("{dependency} entered state {state} while waiting for it to become {wanted}")]
    DependencyFailed {
        dependency: String,
        wanted: &'static str,
        state: String,
    },

    #[error("{addr}: {operation} failed: {message}")]
    CloudApi {
        addr: TaskAddr,
        operation: &'static str,
        message: String,
    },

    #[error("dependency cycle between: {}", join_addrs(tasks))]
    DependencyCycle { tasks: Vec<TaskAddr> },

    #[error("{addr} references unknown task {reference}")]
    UnknownReference { addr: TaskAddr, reference: TaskAddr },

    #[error("task {0} is declared more than once")]
    DuplicateTask(TaskAddr),

    #[error("dependency {dependency} has no identifier")]
    UnresolvedReference { dependency: TaskAddr },

    #[error("{addr}: {source}")]
    Task {
        addr: TaskAddr,
        #[source]
        source: Box<ProvisionerError>,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Sentinel for a field that must be set before a resource can be created.
pub fn required_field(field: &'static str) -> ProvisionerError {
    ProvisionerError::RequiredField { field }
}

/// Sentinel for a field that cannot change once the resource exists.
pub fn cannot_change_field(field: impl Into<String>) -> ProvisionerError {
    ProvisionerError::CannotChangeField {
        fields: vec![field.into()],
    }
}

impl ProvisionerError {
    /// Wrap a provider error with the resource and operation it came from.
    ///
    /// A missing capability stays a [`CloudError::Unsupported`] so it keeps
    /// its fatal severity.
    pub fn cloud_api(addr: &TaskAddr, operation: &'static str, err: CloudError) -> Self {
        match err {
            err @ (CloudError::Unsupported { .. } | CloudError::NotImplemented { .. }) => {
                Self::Cloud(err)
            }
            CloudError::Api { message, .. } => Self::CloudApi {
                addr: addr.clone(),
                operation,
                message,
            },
            other => Self::CloudApi {
                addr: addr.clone(),
                operation,
                message: other.to_string(),
            },
        }
    }

    /// Attach task identity, unless it is already attached.
    pub fn with_task(self, addr: &TaskAddr) -> Self {
        match self {
            Self::Task { .. } => self,
            other => Self::Task {
                addr: addr.clone(),
                source: Box::new(other),
            },
        }
    }

    /// The error with any task wrapper removed.
    pub fn root(&self) -> &ProvisionerError {
        match self {
            Self::Task { source, .. } => source.root(),
            other => other,
        }
    }

    /// Desired state is invalid for the requested change. Aborts the task,
    /// not the run.
    pub fn is_validation(&self) -> bool {
        matches!(
            self.root(),
            Self::RequiredField { .. }
                | Self::CannotChangeField { .. }
                | Self::MissingTarget
                | Self::AmbiguousTarget
        )
    }

    /// Live state or configuration makes the whole run unsafe to continue.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.root(),
            Self::AmbiguousLiveState { .. }
                | Self::Cloud(CloudError::Unsupported { .. })
                | Self::DependencyCycle { .. }
                | Self::UnknownReference { .. }
                | Self::DuplicateTask(_)
        )
    }

    /// Re-running the engine later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.root(), Self::DependencyTimeout { .. })
    }
}

fn join_addrs(addrs: &[TaskAddr]) -> String {
    addrs
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
