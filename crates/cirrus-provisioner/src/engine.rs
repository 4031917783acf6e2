//! Runs a task graph: preflight, dependency-ordered admission, a bounded
//! worker pool, and per-task outcomes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use cirrus_cloud::{Cloud, CloudError};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::EngineConfig;
use crate::error::ProvisionerError;
use crate::graph::TaskGraph;
use crate::plan::Plan;
use crate::reconcile::Reconciled;
use crate::state::{RunReport, TaskOutcome, TaskState};
use crate::target::{ApplyTarget, PlanTarget, Target};
use crate::task::{Context, Identifiers};

type Joined = (usize, Result<Reconciled, ProvisionerError>);

pub struct Engine {
    cloud: Arc<dyn Cloud>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(cloud: Arc<dyn Cloud>, config: EngineConfig) -> Self {
        Self { cloud, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Converge live infrastructure to the graph.
    ///
    /// Returns `Err` only when the graph itself is unusable (cycle, unknown
    /// reference, missing capability). Task failures are in the report.
    pub async fn apply(&self, graph: &TaskGraph) -> Result<RunReport, ProvisionerError> {
        let target = Arc::new(ApplyTarget::new(
            Arc::clone(&self.cloud),
            self.config.wait.clone(),
        ));
        self.run(graph, target).await
    }

    /// Compute the changes [`Engine::apply`] would make without mutating
    /// anything.
    pub async fn plan(&self, graph: &TaskGraph) -> Result<(RunReport, Plan), ProvisionerError> {
        let target = Arc::new(PlanTarget::new());
        let report = self.run(graph, target.clone()).await?;
        let order: Vec<_> = report.outcomes.iter().map(|o| o.addr.clone()).collect();
        let plan = target.to_plan(&order);
        Ok((report, plan))
    }

    /// Every capability the graph needs must exist before any task starts.
    fn preflight(&self, graph: &TaskGraph) -> Result<(), ProvisionerError> {
        for node in graph.nodes() {
            let capability = node.capability();
            if !self.cloud.supports(capability) {
                tracing::error!(
                    addr = %node.addr(),
                    capability = %capability,
                    backend = %self.cloud.kind(),
                    "backend lacks a required capability"
                );
                return Err(ProvisionerError::from(CloudError::Unsupported {
                    capability,
                    backend: self.cloud.kind(),
                })
                .with_task(node.addr()));
            }
        }
        Ok(())
    }

    async fn run(
        &self,
        graph: &TaskGraph,
        target: Arc<dyn Target>,
    ) -> Result<RunReport, ProvisionerError> {
        let started = Instant::now();
        self.config.validate()?;
        let execution = graph.validate()?;
        self.preflight(graph)?;

        let mode = target.mode();
        tracing::info!(
            tasks = graph.len(),
            max_concurrency = self.config.max_concurrency,
            mode = ?mode,
            region = self.cloud.region(),
            "starting reconciliation"
        );

        let mut states = vec![TaskState::Pending; graph.len()];
        let mut outcomes: Vec<TaskOutcome> = (0..graph.len())
            .map(|i| {
                let node = graph.node(i);
                TaskOutcome::pending(node.addr().clone(), node.lifecycle())
            })
            .collect();
        let mut ids = Identifiers::new();
        let mut halted_by = None;

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut join_set: JoinSet<Joined> = JoinSet::new();
        let mut running: HashMap<tokio::task::Id, usize> = HashMap::new();

        loop {
            if halted_by.is_none() {
                for &i in &execution.order {
                    if states[i] != TaskState::Pending {
                        continue;
                    }
                    let ready = execution.dependencies[i]
                        .iter()
                        .all(|&d| states[d].unblocks_dependents());
                    if !ready {
                        continue;
                    }

                    let node = Arc::clone(graph.node(i));
                    tracing::debug!(addr = %node.addr(), "admitting task");
                    states[i] = TaskState::Discovering;

                    let cloud = Arc::clone(&self.cloud);
                    let target = Arc::clone(&target);
                    let semaphore = Arc::clone(&semaphore);
                    let scoped = ids.subset(&node.references());

                    let handle = join_set.spawn(async move {
                        let result = match semaphore.acquire_owned().await {
                            Ok(_permit) => {
                                let ctx = Context {
                                    cloud: cloud.as_ref(),
                                    ids: &scoped,
                                };
                                node.reconcile(&ctx, target.as_ref()).await
                            }
                            Err(e) => Err(ProvisionerError::Config(format!(
                                "worker pool closed: {e}"
                            ))),
                        };
                        (i, result)
                    });
                    running.insert(handle.id(), i);
                }
            }

            let Some(joined) = join_set.join_next_with_id().await else {
                break;
            };

            let (i, result) = match joined {
                Ok((id, (i, result))) => {
                    running.remove(&id);
                    (i, result)
                }
                Err(join_err) => {
                    let Some(i) = running.remove(&join_err.id()) else {
                        continue;
                    };
                    let err = ProvisionerError::Config(format!("task panicked: {join_err}"));
                    (i, Err(err))
                }
            };

            let addr = outcomes[i].addr.clone();
            match result {
                Ok(reconciled) => {
                    tracing::info!(
                        addr = %addr,
                        state = %reconciled.state,
                        changes = reconciled.changes.len(),
                        "task finished"
                    );
                    states[i] = reconciled.state;
                    let outcome = &mut outcomes[i];
                    outcome.state = reconciled.state;
                    outcome.changes = reconciled.changes;
                    if let Some(id) = reconciled.identifier {
                        outcome.identifier = Some(id.value.clone());
                        ids.insert(addr, id);
                    }
                }
                Err(err) => {
                    let state = if err.is_validation() {
                        TaskState::Error
                    } else {
                        TaskState::Failed
                    };
                    let err = err.with_task(&addr);
                    tracing::error!(
                        addr = %addr,
                        state = %state,
                        fatal = err.is_fatal(),
                        retryable = err.is_retryable(),
                        error = %err,
                        "task failed"
                    );

                    if state == TaskState::Failed && halted_by.is_none() {
                        tracing::warn!(addr = %addr, "halting further admissions");
                        halted_by = Some(addr);
                    }
                    states[i] = state;
                    outcomes[i].state = state;
                    outcomes[i].error = Some(err);
                }
            }
        }

        let ordered: Vec<TaskOutcome> = {
            let mut slots: Vec<Option<TaskOutcome>> = outcomes.into_iter().map(Some).collect();
            execution
                .order
                .iter()
                .filter_map(|&i| slots[i].take())
                .collect()
        };

        let report = RunReport {
            outcomes: ordered,
            halted_by,
            elapsed: started.elapsed(),
        };

        tracing::info!(
            done = report.count(TaskState::Done),
            no_op = report.count(TaskState::NoOp),
            skipped = report.count(TaskState::SkippedByPolicy),
            error = report.count(TaskState::Error),
            failed = report.count(TaskState::Failed),
            pending = report.count(TaskState::Pending),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "reconciliation finished"
        );

        Ok(report)
    }
}
