//! Drives a single task through discover → diff → validate → render.

use cirrus_cloud::Capability;

use crate::addr::TaskAddr;
use crate::drift::Changes;
use crate::error::ProvisionerError;
use crate::lifecycle::Lifecycle;
use crate::state::TaskState;
use crate::target::{Target, TargetMode};
use crate::task::{BoxFuture, Context, Identifier, Task};

/// Terminal result of reconciling one task.
#[derive(Debug)]
pub(crate) struct Reconciled {
    pub state: TaskState,
    pub identifier: Option<Identifier>,
    pub changes: Changes,
}

/// Object-safe view of a [`Task`], used by the graph and engine.
pub(crate) trait DynTask: Send + Sync {
    fn addr(&self) -> &TaskAddr;

    fn lifecycle(&self) -> Lifecycle;

    fn references(&self) -> Vec<TaskAddr>;

    fn capability(&self) -> Capability;

    fn reconcile<'a>(
        &'a self,
        ctx: &'a Context<'a>,
        target: &'a dyn Target,
    ) -> BoxFuture<'a, Result<Reconciled, ProvisionerError>>;
}

impl<T: Task> DynTask for T {
    fn addr(&self) -> &TaskAddr {
        Task::addr(self)
    }

    fn lifecycle(&self) -> Lifecycle {
        Task::lifecycle(self)
    }

    fn references(&self) -> Vec<TaskAddr> {
        Task::references(self)
    }

    fn capability(&self) -> Capability {
        Task::capability(self)
    }

    fn reconcile<'a>(
        &'a self,
        ctx: &'a Context<'a>,
        target: &'a dyn Target,
    ) -> BoxFuture<'a, Result<Reconciled, ProvisionerError>> {
        Box::pin(reconcile(self, ctx, target))
    }
}

async fn reconcile<T: Task>(
    task: &T,
    ctx: &Context<'_>,
    target: &dyn Target,
) -> Result<Reconciled, ProvisionerError> {
    let addr = Task::addr(task);
    let lifecycle = Task::lifecycle(task);
    let desired = task.resolve(ctx.ids)?;

    tracing::debug!(addr = %addr, state = %TaskState::Discovering, "task state");
    let key_references = task.discovery_references();
    let actual = if ctx.ids.any_placeholder(&key_references) {
        // The lookup key names a resource that only exists in the plan, so
        // there is nothing live to find.
        tracing::debug!(addr = %addr, "dependencies are planned, skipping discovery");
        None
    } else {
        task.find(ctx, &desired).await?
    };

    // Pre-existing identifier: from the live object, or declared outright
    // (shared resources).
    let existing = actual
        .as_ref()
        .and_then(|a| task.identifier(a))
        .or_else(|| task.identifier(&desired))
        .map(Identifier::live);

    let changes = match &actual {
        Some(actual) => Changes::between(&desired, actual)?,
        None => Changes::creation(&desired)?,
    };

    if actual.is_some() && changes.is_empty() {
        tracing::debug!(addr = %addr, state = %TaskState::NoOp, "in sync");
        return Ok(Reconciled {
            state: TaskState::NoOp,
            identifier: existing,
            changes,
        });
    }

    if lifecycle.validates() {
        tracing::debug!(addr = %addr, state = %TaskState::Validating, "task state");
        task.check_changes(actual.as_ref(), &desired, &changes)?;
    }

    if !lifecycle.permits_mutation() {
        if lifecycle.reports_divergence() {
            tracing::warn!(
                addr = %addr,
                lifecycle = %lifecycle,
                exists = actual.is_some(),
                fields = ?changes.fields().collect::<Vec<_>>(),
                "divergence left in place by lifecycle policy"
            );
        } else {
            tracing::debug!(addr = %addr, lifecycle = %lifecycle, "externally managed, not reconciled");
        }
        return Ok(Reconciled {
            state: TaskState::SkippedByPolicy,
            identifier: existing,
            changes,
        });
    }

    tracing::debug!(addr = %addr, state = %TaskState::Rendering, "task state");
    let rendered = task
        .render(target, actual.as_ref(), &desired, &changes)
        .await?;

    let identifier = match rendered.id {
        Some(value) if target.mode() == TargetMode::Plan => Some(Identifier::placeholder(value)),
        Some(value) => Some(Identifier::live(value)),
        None => existing,
    };

    Ok(Reconciled {
        state: TaskState::Done,
        identifier,
        changes,
    })
}
