use std::collections::HashMap;
use std::fmt;

use cirrus_cloud::{Capability, Cloud};
use serde::Serialize;

pub use cirrus_cloud::BoxFuture;

use crate::addr::TaskAddr;
use crate::drift::Changes;
use crate::error::ProvisionerError;
use crate::lifecycle::Lifecycle;
use crate::target::Target;

/// A cloud-assigned identifier published by a finished task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    pub value: String,
    /// Synthesized by the plan target; no live object carries it yet.
    pub placeholder: bool,
}

impl Identifier {
    pub fn live(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            placeholder: false,
        }
    }

    pub fn placeholder(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            placeholder: true,
        }
    }
}

/// Identifiers of finished tasks, keyed by address.
#[derive(Debug, Clone, Default)]
pub struct Identifiers {
    resolved: HashMap<TaskAddr, Identifier>,
}

impl Identifiers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, addr: TaskAddr, id: Identifier) {
        self.resolved.insert(addr, id);
    }

    /// The identifier of `addr`, or an error if it finished without one.
    pub fn id(&self, addr: &TaskAddr) -> Result<String, ProvisionerError> {
        self.resolved
            .get(addr)
            .map(|id| id.value.clone())
            .ok_or_else(|| ProvisionerError::UnresolvedReference {
                dependency: addr.clone(),
            })
    }

    pub fn any_placeholder<'a>(&self, addrs: impl IntoIterator<Item = &'a TaskAddr>) -> bool {
        addrs
            .into_iter()
            .any(|a| self.resolved.get(a).is_some_and(|id| id.placeholder))
    }

    /// Only the entries for `addrs`.
    pub fn subset(&self, addrs: &[TaskAddr]) -> Self {
        let resolved = addrs
            .iter()
            .filter_map(|a| self.resolved.get(a).map(|id| (a.clone(), id.clone())))
            .collect();
        Self { resolved }
    }
}

/// What a task sees of the world while it runs.
pub struct Context<'a> {
    pub cloud: &'a dyn Cloud,
    /// Identifiers of the tasks this task references.
    pub ids: &'a Identifiers,
}

/// Result of a successful render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
    /// Identifier assigned by the create call, if the resource has one.
    pub id: Option<String>,
}

impl Rendered {
    pub fn created(id: Option<String>) -> Self {
        Self { id }
    }

    pub fn unchanged() -> Self {
        Self::default()
    }
}

/// One declarative unit of infrastructure.
///
/// A task is the *desired* declaration. [`Task::resolve`] turns it into a
/// `State` by filling in dependency identifiers; [`Task::find`] produces
/// the *actual* `State` from the cloud. The engine diffs the two into
/// [`Changes`] and then calls [`Task::check_changes`] and, if policy
/// allows, [`Task::render`].
///
/// Every field of `State` should be an `Option`: `None` in desired state
/// means "no opinion" and never produces a change.
///
/// Async methods return boxed futures so the engine can hold tasks of
/// different kinds behind one trait object.
pub trait Task: Send + Sync + 'static {
    type State: Clone + fmt::Debug + PartialEq + Serialize + Send + Sync + 'static;

    fn addr(&self) -> &TaskAddr;

    fn lifecycle(&self) -> Lifecycle;

    /// Tasks whose identifiers this task needs.
    fn references(&self) -> Vec<TaskAddr>;

    /// References whose identifiers key the lookup in [`Task::find`].
    /// Discovery is skipped while any of them is only planned.
    fn discovery_references(&self) -> Vec<TaskAddr> {
        self.references()
    }

    fn capability(&self) -> Capability {
        self.addr().kind.capability()
    }

    /// Desired state with references replaced by identifiers.
    fn resolve(&self, ids: &Identifiers) -> Result<Self::State, ProvisionerError>;

    /// Look up the live object using only the fields that key it.
    /// Returns `Ok(None)` if it doesn't exist yet.
    fn find<'a>(
        &'a self,
        ctx: &'a Context<'a>,
        desired: &'a Self::State,
    ) -> BoxFuture<'a, Result<Option<Self::State>, ProvisionerError>>;

    /// Identifier carried by a snapshot, if any.
    fn identifier(&self, state: &Self::State) -> Option<String>;

    /// Validate a change before anything is mutated. `actual == None`
    /// means the resource would be created.
    fn check_changes(
        &self,
        actual: Option<&Self::State>,
        desired: &Self::State,
        changes: &Changes,
    ) -> Result<(), ProvisionerError>;

    /// Converge the resource through `target`.
    fn render<'a>(
        &'a self,
        target: &'a dyn Target,
        actual: Option<&'a Self::State>,
        desired: &'a Self::State,
        changes: &'a Changes,
    ) -> BoxFuture<'a, Result<Rendered, ProvisionerError>>;
}

/// Zero matches is absence, one is the resource, more is live state the
/// engine refuses to reconcile.
pub fn expect_unique<T>(addr: &TaskAddr, mut found: Vec<T>) -> Result<Option<T>, ProvisionerError> {
    match found.len() {
        0 => Ok(None),
        1 => Ok(found.pop()),
        count => Err(ProvisionerError::AmbiguousLiveState {
            addr: addr.clone(),
            count,
        }),
    }
}
