//! Scheduling behavior of the engine, driven by a probe task that records
//! when it runs.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cirrus_cloud::model::{Capability, Tags, VpcRecord};
use cirrus_cloud::{CloudError, MemoryCloud};
use cirrus_provisioner::target::Target;
use cirrus_provisioner::task::BoxFuture;
use cirrus_provisioner::tasks::{InternetGateway, Vpc};
use cirrus_provisioner::{
    Changes, Context, Engine, EngineConfig, Identifiers, Lifecycle, ProvisionerError, Rendered,
    Task, TaskAddr, TaskGraph, TaskState,
};
use serde::Serialize;

#[derive(Default)]
struct Recorder {
    active: AtomicUsize,
    peak: AtomicUsize,
    finished: Mutex<BTreeSet<TaskAddr>>,
    violations: Mutex<Vec<String>>,
}

struct Probe {
    addr: TaskAddr,
    deps: Vec<TaskAddr>,
    recorder: Arc<Recorder>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
struct ProbeState {
    id: String,
}

impl Probe {
    fn new(name: &str, deps: &[&str], recorder: &Arc<Recorder>) -> Self {
        Self {
            addr: TaskAddr::vpc(name),
            deps: deps.iter().map(|d| TaskAddr::vpc(*d)).collect(),
            recorder: recorder.clone(),
        }
    }
}

impl Task for Probe {
    type State = ProbeState;

    fn addr(&self) -> &TaskAddr {
        &self.addr
    }

    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::Sync
    }

    fn references(&self) -> Vec<TaskAddr> {
        self.deps.clone()
    }

    fn resolve(&self, ids: &Identifiers) -> Result<ProbeState, ProvisionerError> {
        for dep in &self.deps {
            ids.id(dep)?;
        }
        Ok(ProbeState {
            id: format!("id-{}", self.addr.name),
        })
    }

    fn find<'a>(
        &'a self,
        _ctx: &'a Context<'a>,
        _desired: &'a ProbeState,
    ) -> BoxFuture<'a, Result<Option<ProbeState>, ProvisionerError>> {
        Box::pin(async { Ok(None) })
    }

    fn identifier(&self, state: &ProbeState) -> Option<String> {
        Some(state.id.clone())
    }

    fn check_changes(
        &self,
        _actual: Option<&ProbeState>,
        _desired: &ProbeState,
        _changes: &Changes,
    ) -> Result<(), ProvisionerError> {
        Ok(())
    }

    fn render<'a>(
        &'a self,
        _target: &'a dyn Target,
        _actual: Option<&'a ProbeState>,
        desired: &'a ProbeState,
        _changes: &'a Changes,
    ) -> BoxFuture<'a, Result<Rendered, ProvisionerError>> {
        Box::pin(async move {
            let recorder = &self.recorder;
            {
                let finished = recorder.finished.lock().unwrap();
                for dep in &self.deps {
                    if !finished.contains(dep) {
                        recorder
                            .violations
                            .lock()
                            .unwrap()
                            .push(format!("{} started before {dep}", self.addr));
                    }
                }
            }

            let now = recorder.active.fetch_add(1, Ordering::SeqCst) + 1;
            recorder.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            recorder.active.fetch_sub(1, Ordering::SeqCst);

            recorder.finished.lock().unwrap().insert(self.addr.clone());
            Ok(Rendered::created(Some(desired.id.clone())))
        })
    }
}

fn config(max_concurrency: usize) -> EngineConfig {
    EngineConfig {
        max_concurrency,
        ..EngineConfig::default()
    }
}

fn memory() -> Arc<MemoryCloud> {
    Arc::new(MemoryCloud::new("us-east-1"))
}

#[tokio::test]
async fn dependencies_finish_before_dependents_start() {
    let recorder = Arc::new(Recorder::default());
    let mut graph = TaskGraph::new();
    graph.add(Probe::new("d", &["b", "c"], &recorder)).unwrap();
    graph.add(Probe::new("b", &["a"], &recorder)).unwrap();
    graph.add(Probe::new("c", &["a"], &recorder)).unwrap();
    graph.add(Probe::new("a", &[], &recorder)).unwrap();

    let report = Engine::new(memory(), config(4)).apply(&graph).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.count(TaskState::Done), 4);
    assert!(recorder.violations.lock().unwrap().is_empty());

    let order: Vec<String> = report
        .outcomes
        .iter()
        .map(|o| o.addr.name.clone())
        .collect();
    assert_eq!(order, vec!["a", "b", "c", "d"]);
}

#[tokio::test]
async fn concurrency_is_bounded() {
    let recorder = Arc::new(Recorder::default());
    let mut graph = TaskGraph::new();
    for i in 0..8 {
        graph
            .add(Probe::new(&format!("p{i}"), &[], &recorder))
            .unwrap();
    }

    let report = Engine::new(memory(), config(2)).apply(&graph).await.unwrap();

    assert_eq!(report.count(TaskState::Done), 8);
    let peak = recorder.peak.load(Ordering::SeqCst);
    assert!(peak <= 2, "peak concurrency {peak} exceeded the limit");
    assert!(peak >= 1);
}

#[tokio::test]
async fn independent_tasks_run_in_parallel() {
    let recorder = Arc::new(Recorder::default());
    let mut graph = TaskGraph::new();
    for i in 0..4 {
        graph
            .add(Probe::new(&format!("p{i}"), &[], &recorder))
            .unwrap();
    }

    Engine::new(memory(), config(4)).apply(&graph).await.unwrap();

    assert!(recorder.peak.load(Ordering::SeqCst) > 1);
}

#[tokio::test]
async fn cycles_are_rejected_before_any_call() {
    let recorder = Arc::new(Recorder::default());
    let mut graph = TaskGraph::new();
    graph.add(Probe::new("a", &["c"], &recorder)).unwrap();
    graph.add(Probe::new("b", &["a"], &recorder)).unwrap();
    graph.add(Probe::new("c", &["b"], &recorder)).unwrap();
    graph.add(Probe::new("free", &[], &recorder)).unwrap();

    let cloud = memory();
    let err = Engine::new(cloud.clone(), config(4))
        .apply(&graph)
        .await
        .unwrap_err();

    match err {
        ProvisionerError::DependencyCycle { tasks } => {
            let names: Vec<_> = tasks.iter().map(|t| t.name.as_str()).collect();
            assert_eq!(names, vec!["a", "b", "c"]);
        }
        other => panic!("expected DependencyCycle, got {other:?}"),
    }
    assert!(cloud.calls().is_empty());
    assert!(recorder.finished.lock().unwrap().is_empty());
}

#[test]
fn unknown_references_are_rejected() {
    let mut graph = TaskGraph::new();
    graph
        .add(InternetGateway::new("igw").vpc(TaskAddr::vpc("ghost")))
        .unwrap();

    let err = graph.execution_order().unwrap_err();
    assert_eq!(
        err.to_string(),
        "internet_gateway.igw references unknown task vpc.ghost"
    );
}

#[test]
fn duplicate_tasks_are_rejected() {
    let mut graph = TaskGraph::new();
    graph.add(Vpc::new("main").cidr_block("10.0.0.0/16")).unwrap();

    let err = graph
        .add(Vpc::new("main").cidr_block("10.1.0.0/16"))
        .unwrap_err();
    assert!(matches!(err, ProvisionerError::DuplicateTask(addr) if addr == TaskAddr::vpc("main")));
    assert_eq!(graph.len(), 1);
}

#[test]
fn execution_order_breaks_ties_by_declaration() {
    let recorder = Arc::new(Recorder::default());
    let mut graph = TaskGraph::new();
    graph.add(Probe::new("z", &[], &recorder)).unwrap();
    graph.add(Probe::new("y", &["z"], &recorder)).unwrap();
    graph.add(Probe::new("x", &[], &recorder)).unwrap();

    let order: Vec<_> = graph
        .execution_order()
        .unwrap()
        .into_iter()
        .map(|a| a.name)
        .collect();
    assert_eq!(order, vec!["z", "x", "y"]);
}

#[tokio::test]
async fn failure_leaves_dependents_pending() {
    let cloud = MemoryCloud::new("us-east-1");
    cloud.fail_operation("CreateVpc");
    let cloud = Arc::new(cloud);

    let mut graph = TaskGraph::new();
    graph.add(Vpc::new("main").cidr_block("10.0.0.0/16")).unwrap();
    graph
        .add(InternetGateway::new("main").vpc(TaskAddr::vpc("main")))
        .unwrap();

    let report = Engine::new(cloud.clone(), config(4)).apply(&graph).await.unwrap();

    assert_eq!(report.state(&TaskAddr::vpc("main")), Some(TaskState::Failed));
    assert_eq!(
        report.state(&TaskAddr::internet_gateway("main")),
        Some(TaskState::Pending)
    );
    assert_eq!(report.halted_by, Some(TaskAddr::vpc("main")));
    assert!(!cloud.operations().contains(&"CreateInternetGateway"));

    let err = report.into_result().unwrap_err();
    assert!(matches!(
        err.root(),
        ProvisionerError::CloudApi { operation: "CreateVpc", .. }
    ));
}

#[tokio::test]
async fn validation_error_does_not_stop_unrelated_tasks() {
    let cloud = memory();
    let mut graph = TaskGraph::new();
    // No CIDR block: fails validation.
    graph.add(Vpc::new("broken")).unwrap();
    graph
        .add(InternetGateway::new("broken").vpc(TaskAddr::vpc("broken")))
        .unwrap();
    graph.add(Vpc::new("fine").cidr_block("10.1.0.0/16")).unwrap();

    let report = Engine::new(cloud.clone(), config(1)).apply(&graph).await.unwrap();

    let broken = report.outcome(&TaskAddr::vpc("broken")).unwrap();
    assert_eq!(broken.state, TaskState::Error);
    assert_eq!(
        broken.error.as_ref().unwrap().root().to_string(),
        "field cidr_block is required"
    );
    assert_eq!(
        report.state(&TaskAddr::internet_gateway("broken")),
        Some(TaskState::Pending)
    );
    assert_eq!(report.state(&TaskAddr::vpc("fine")), Some(TaskState::Done));
    assert!(report.halted_by.is_none());
    assert_eq!(cloud.vpcs_snapshot().len(), 1);
}

#[tokio::test]
async fn unsupported_capability_fails_preflight() {
    let cloud = Arc::new(MemoryCloud::new("us-east-1").without(Capability::InternetGateways));
    let mut graph = TaskGraph::new();
    graph.add(Vpc::new("main").cidr_block("10.0.0.0/16")).unwrap();
    graph
        .add(InternetGateway::new("main").vpc(TaskAddr::vpc("main")))
        .unwrap();

    let err = Engine::new(cloud.clone(), config(4))
        .apply(&graph)
        .await
        .unwrap_err();

    assert!(matches!(
        err.root(),
        ProvisionerError::Cloud(CloudError::Unsupported {
            capability: Capability::InternetGateways,
            ..
        })
    ));
    assert!(err.is_fatal());
    assert!(cloud.calls().is_empty());
}

#[tokio::test]
async fn zero_concurrency_is_a_config_error() {
    let graph = TaskGraph::new();
    let err = Engine::new(memory(), config(0)).apply(&graph).await.unwrap_err();
    assert!(matches!(err, ProvisionerError::Config(_)));
}

#[tokio::test]
async fn externally_managed_resource_is_never_validated_or_changed() {
    let cloud = MemoryCloud::new("us-east-1");
    cloud.seed_vpc(VpcRecord {
        id: "vpc-shared".into(),
        cidr_block: "10.0.0.0/16".into(),
        tags: Tags::new(),
    });
    let cloud = Arc::new(cloud);

    let mut graph = TaskGraph::new();
    // Would be an immutable-field error if it were validated.
    graph
        .add(Vpc::new("shared").shared("vpc-shared").cidr_block("10.5.0.0/16"))
        .unwrap();
    graph
        .add(InternetGateway::new("main").vpc(TaskAddr::vpc("shared")))
        .unwrap();

    let report = Engine::new(cloud.clone(), config(4)).apply(&graph).await.unwrap();

    let shared = report.outcome(&TaskAddr::vpc("shared")).unwrap();
    assert_eq!(shared.state, TaskState::SkippedByPolicy);
    assert!(shared.changes.contains("cidr_block"));
    assert_eq!(shared.identifier.as_deref(), Some("vpc-shared"));

    // Dependents still see the shared id.
    assert_eq!(
        report.state(&TaskAddr::internet_gateway("main")),
        Some(TaskState::Done)
    );
    assert!(!cloud.operations().contains(&"CreateVpc"));
}

#[tokio::test]
async fn warn_only_absent_resource_is_not_created() {
    let cloud = memory();
    let mut graph = TaskGraph::new();
    graph
        .add(
            Vpc::new("main")
                .cidr_block("10.0.0.0/16")
                .with_lifecycle(Lifecycle::WarnOnly),
        )
        .unwrap();

    let report = Engine::new(cloud.clone(), config(4)).apply(&graph).await.unwrap();

    let outcome = report.outcome(&TaskAddr::vpc("main")).unwrap();
    assert_eq!(outcome.state, TaskState::SkippedByPolicy);
    assert!(outcome.identifier.is_none());
    assert_eq!(cloud.mutation_count(), 0);
}
