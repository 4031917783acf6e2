//! cirrus-provisioner
//!
//! Declarative reconciliation engine for cluster networking. Each piece of
//! infrastructure is a [`Task`]; tasks reference each other by
//! [`TaskAddr`] and form a [`TaskGraph`]. The [`Engine`] drives every task
//! through discover → diff → validate → render in dependency order,
//! against either the live cloud or a recorded [`Plan`].
//!
//! Public API:
//! - `provision()`: build the graph for a topology and converge it
//! - `plan()`: same, but only record what would change
//! - [`Engine`]: run an arbitrary graph of tasks

pub mod addr;
pub mod config;
pub mod drift;
pub mod engine;
pub mod error;
pub mod graph;
pub mod lifecycle;
pub mod manifest;
pub mod persistence;
pub mod plan;
mod reconcile;
pub mod state;
pub mod target;
pub mod task;
pub mod tasks;
pub mod wait;

use std::sync::Arc;

use cirrus_cloud::Cloud;

pub use crate::addr::{ResourceKind, TaskAddr};
pub use crate::config::{load_config, save_config, EngineConfig};
pub use crate::drift::{Changes, FieldDrift};
pub use crate::engine::Engine;
pub use crate::error::ProvisionerError;
pub use crate::graph::TaskGraph;
pub use crate::lifecycle::Lifecycle;
pub use crate::manifest::{ClusterTopology, Egress, ZoneTopology};
pub use crate::persistence::{load_plan, save_plan};
pub use crate::plan::{Plan, PlanAction, PlanRecord};
pub use crate::state::{RunReport, TaskOutcome, TaskState};
pub use crate::task::{Context, Identifiers, Rendered, Task};
pub use crate::wait::WaitConfig;

/// Converge the cluster network described by `topology`.
pub async fn provision(
    cloud: Arc<dyn Cloud>,
    config: EngineConfig,
    topology: &ClusterTopology,
) -> Result<RunReport, ProvisionerError> {
    let graph = topology.build_graph()?;
    let report = Engine::new(cloud, config).apply(&graph).await?;

    if report.count(TaskState::Done) == 0 && report.is_success() {
        tracing::info!(cluster = %topology.name, "all resources in sync, no changes needed");
    }
    report.into_result()
}

/// What [`provision`] would change, without changing anything.
pub async fn plan(
    cloud: Arc<dyn Cloud>,
    config: EngineConfig,
    topology: &ClusterTopology,
) -> Result<Plan, ProvisionerError> {
    let graph = topology.build_graph()?;
    let (report, plan) = Engine::new(cloud, config).plan(&graph).await?;
    report.into_result()?;

    tracing::info!(cluster = %topology.name, summary = %plan, "plan computed");
    Ok(plan)
}
