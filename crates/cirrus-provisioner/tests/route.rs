//! Route reconciliation against the in-memory cloud.

use std::sync::Arc;

use cirrus_cloud::model::{
    NatGatewayRecord, NatGatewayState, RouteRecord, RouteState as LiveRouteState,
    RouteTableRecord, RouteTarget, Tags,
};
use cirrus_cloud::MemoryCloud;
use cirrus_provisioner::tasks::{NatGateway, Route, RouteState, RouteTable};
use cirrus_provisioner::{
    Changes, Engine, EngineConfig, Lifecycle, ProvisionerError, TaskAddr, TaskGraph, TaskState,
    Task, WaitConfig,
};

const BLOCK: &str = "10.0.0.0/16";

fn fast_config() -> EngineConfig {
    EngineConfig {
        wait: WaitConfig {
            initial_delay_ms: 1,
            max_delay_ms: 5,
            multiplier: 2.0,
            timeout_secs: 5,
        },
        ..EngineConfig::default()
    }
}

fn nat(id: &str, state: NatGatewayState) -> NatGatewayRecord {
    NatGatewayRecord {
        id: id.into(),
        subnet_id: "subnet-1".into(),
        allocation_id: Some("eipalloc-1".into()),
        state,
        tags: Tags::new(),
    }
}

fn route_row(target_nat: &str, state: LiveRouteState) -> RouteRecord {
    RouteRecord {
        route_table_id: "rt-1".into(),
        destination_cidr_block: BLOCK.into(),
        gateway_id: None,
        nat_gateway_id: Some(target_nat.into()),
        state,
    }
}

/// A cloud holding route table rt-1 and available NAT gateways nat-1, nat-2.
fn cloud() -> Arc<MemoryCloud> {
    let cloud = MemoryCloud::new("us-east-1");
    cloud.seed_route_table(RouteTableRecord {
        id: "rt-1".into(),
        vpc_id: "vpc-1".into(),
        tags: Tags::new(),
    });
    cloud.seed_nat_gateway(nat("nat-1", NatGatewayState::Available), 0);
    cloud.seed_nat_gateway(nat("nat-2", NatGatewayState::Available), 0);
    Arc::new(cloud)
}

fn route_addr() -> TaskAddr {
    TaskAddr::route("private")
}

/// rt-1 and nat-1 as shared dependencies, plus `route`.
fn graph_with(route: Route) -> TaskGraph {
    let mut graph = TaskGraph::new();
    graph.add(RouteTable::new("rt-1").shared("rt-1")).unwrap();
    graph.add(NatGateway::new("nat-1").shared("nat-1")).unwrap();
    graph.add(route).unwrap();
    graph
}

fn route_to_nat() -> Route {
    Route::new("private")
        .route_table(TaskAddr::route_table("rt-1"))
        .destination(BLOCK)
        .nat_gateway(TaskAddr::nat_gateway("nat-1"))
}

#[tokio::test]
async fn creates_route_after_nat_gateway_becomes_available() {
    let cloud = MemoryCloud::new("us-east-1");
    cloud.seed_route_table(RouteTableRecord {
        id: "rt-1".into(),
        vpc_id: "vpc-1".into(),
        tags: Tags::new(),
    });
    // Discovery uses one poll; the route then has to wait for two more.
    cloud.seed_nat_gateway(nat("nat-1", NatGatewayState::Pending), 3);
    let cloud = Arc::new(cloud);

    let report = Engine::new(cloud.clone(), fast_config())
        .apply(&graph_with(route_to_nat()))
        .await
        .unwrap();

    let outcome = report.outcome(&route_addr()).unwrap();
    assert_eq!(outcome.state, TaskState::Done, "{:?}", outcome.error);
    assert_eq!(outcome.identifier, None);

    let ops = cloud.operations();
    let create = ops.iter().position(|op| *op == "CreateRoute").unwrap();
    let last_poll = ops.iter().rposition(|op| *op == "DescribeNatGateways").unwrap();
    assert!(last_poll < create, "route created before NAT gateway was ready: {ops:?}");
    assert_eq!(ops.iter().filter(|op| **op == "DescribeNatGateways").count(), 3);

    let routes = cloud.routes_snapshot();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].target(), Some(RouteTarget::NatGateway("nat-1".into())));
}

#[tokio::test]
async fn replaces_route_with_different_target() {
    let cloud = cloud();
    cloud.seed_route(route_row("nat-2", LiveRouteState::Active));

    let report = Engine::new(cloud.clone(), fast_config())
        .apply(&graph_with(route_to_nat()))
        .await
        .unwrap();

    let outcome = report.outcome(&route_addr()).unwrap();
    assert_eq!(outcome.state, TaskState::Done);
    assert_eq!(outcome.changes.fields().collect::<Vec<_>>(), vec!["target"]);

    assert!(cloud.operations().contains(&"ReplaceRoute"));
    assert!(!cloud.operations().contains(&"CreateRoute"));
    assert_eq!(
        cloud.routes_snapshot()[0].target(),
        Some(RouteTarget::NatGateway("nat-1".into()))
    );
}

#[test]
fn both_targets_is_ambiguous() {
    let route = Route::new("private")
        .route_table(TaskAddr::route_table("rt-1"))
        .destination(BLOCK)
        .gateway(TaskAddr::internet_gateway("igw"))
        .nat_gateway(TaskAddr::nat_gateway("nat-1"));
    let desired = RouteState {
        route_table_id: Some("rt-1".into()),
        destination_cidr_block: Some(BLOCK.into()),
        target: None,
    };
    let changes = Changes::creation(&desired).unwrap();

    let err = route.check_changes(None, &desired, &changes).unwrap_err();
    assert!(matches!(err, ProvisionerError::AmbiguousTarget));
}

#[test]
fn no_target_is_missing() {
    let route = Route::new("private")
        .route_table(TaskAddr::route_table("rt-1"))
        .destination(BLOCK);
    let desired = RouteState {
        route_table_id: Some("rt-1".into()),
        destination_cidr_block: Some(BLOCK.into()),
        target: None,
    };
    let changes = Changes::creation(&desired).unwrap();

    let err = route.check_changes(None, &desired, &changes).unwrap_err();
    assert!(matches!(err, ProvisionerError::MissingTarget));
}

#[tokio::test]
async fn ambiguous_target_never_mutates() {
    let cloud = cloud();
    let mut graph = TaskGraph::new();
    graph.add(RouteTable::new("rt-1").shared("rt-1")).unwrap();
    graph.add(NatGateway::new("nat-1").shared("nat-1")).unwrap();
    graph
        .add(route_to_nat().gateway(TaskAddr::nat_gateway("nat-1")))
        .unwrap();

    let report = Engine::new(cloud.clone(), fast_config()).apply(&graph).await.unwrap();

    let outcome = report.outcome(&route_addr()).unwrap();
    assert_eq!(outcome.state, TaskState::Error);
    let err = outcome.error.as_ref().unwrap();
    assert!(matches!(err.root(), ProvisionerError::AmbiguousTarget));
    assert_eq!(cloud.mutation_count(), 0);
    // Validation errors don't halt the run.
    assert!(report.halted_by.is_none());
}

#[tokio::test]
async fn duplicate_live_routes_halt_the_run() {
    let cloud = cloud();
    cloud.seed_route(route_row("nat-1", LiveRouteState::Active));
    cloud.seed_route(route_row("nat-2", LiveRouteState::Active));

    let report = Engine::new(cloud.clone(), fast_config())
        .apply(&graph_with(route_to_nat()))
        .await
        .unwrap();

    let outcome = report.outcome(&route_addr()).unwrap();
    assert_eq!(outcome.state, TaskState::Failed);
    let err = outcome.error.as_ref().unwrap();
    assert!(matches!(
        err.root(),
        ProvisionerError::AmbiguousLiveState { count: 2, .. }
    ));
    assert!(err.is_fatal());
    assert_eq!(report.halted_by, Some(route_addr()));
    assert_eq!(cloud.mutation_count(), 0);

    let err = report.into_result().unwrap_err();
    assert!(err.to_string().starts_with("route.private: found 2 live objects"));
}

#[tokio::test]
async fn blackhole_route_is_repointed() {
    let cloud = cloud();
    cloud.seed_route(route_row("nat-deleted", LiveRouteState::Blackhole));

    let report = Engine::new(cloud.clone(), fast_config())
        .apply(&graph_with(route_to_nat()))
        .await
        .unwrap();

    let outcome = report.outcome(&route_addr()).unwrap();
    assert_eq!(outcome.state, TaskState::Done);
    let drift = outcome.changes.get("target").unwrap();
    assert!(drift.actual.is_null(), "blackhole target should be cleared");
    assert!(cloud.operations().contains(&"ReplaceRoute"));
    assert_eq!(cloud.routes_snapshot()[0].state, LiveRouteState::Active);
}

#[tokio::test]
async fn matching_route_is_left_alone() {
    let cloud = cloud();
    cloud.seed_route(route_row("nat-1", LiveRouteState::Active));

    let report = Engine::new(cloud.clone(), fast_config())
        .apply(&graph_with(route_to_nat()))
        .await
        .unwrap();

    assert_eq!(report.state(&route_addr()), Some(TaskState::NoOp));
    assert_eq!(cloud.mutation_count(), 0);
    assert!(report.is_success());
}

#[test]
fn immutable_fields_are_named_without_mutable_ones() {
    let route = route_to_nat();
    let actual = RouteState {
        route_table_id: Some("rt-1".into()),
        destination_cidr_block: Some(BLOCK.into()),
        target: Some(RouteTarget::NatGateway("nat-2".into())),
    };
    let desired = RouteState {
        route_table_id: Some("rt-9".into()),
        destination_cidr_block: Some(BLOCK.into()),
        target: Some(RouteTarget::NatGateway("nat-1".into())),
    };
    let changes = Changes::between(&desired, &actual).unwrap();
    assert_eq!(changes.len(), 2);

    let err = route.check_changes(Some(&actual), &desired, &changes).unwrap_err();
    match err {
        ProvisionerError::CannotChangeField { fields } => {
            assert_eq!(fields, vec!["route_table_id".to_string()]);
        }
        other => panic!("expected CannotChangeField, got {other:?}"),
    }
}

#[tokio::test]
async fn unapplied_route_mutation_fails_the_task() {
    let cloud = cloud();
    cloud.reject_mutations(true);

    let report = Engine::new(cloud.clone(), fast_config())
        .apply(&graph_with(route_to_nat()))
        .await
        .unwrap();

    let outcome = report.outcome(&route_addr()).unwrap();
    assert_eq!(outcome.state, TaskState::Failed);
    match outcome.error.as_ref().unwrap().root() {
        ProvisionerError::CloudApi {
            addr, operation, ..
        } => {
            assert_eq!(addr, &route_addr());
            assert_eq!(*operation, "CreateRoute");
        }
        other => panic!("expected CloudApi, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_nat_gateway_fails_the_route() {
    let cloud = MemoryCloud::new("us-east-1");
    cloud.seed_route_table(RouteTableRecord {
        id: "rt-1".into(),
        vpc_id: "vpc-1".into(),
        tags: Tags::new(),
    });
    cloud.seed_nat_gateway(nat("nat-1", NatGatewayState::Failed), 0);
    let cloud = Arc::new(cloud);

    let report = Engine::new(cloud.clone(), fast_config())
        .apply(&graph_with(route_to_nat()))
        .await
        .unwrap();

    let outcome = report.outcome(&route_addr()).unwrap();
    assert_eq!(outcome.state, TaskState::Failed);
    assert!(matches!(
        outcome.error.as_ref().unwrap().root(),
        ProvisionerError::DependencyFailed { .. }
    ));
    assert_eq!(cloud.mutation_count(), 0);
}

#[tokio::test]
async fn pending_nat_gateway_times_out() {
    let cloud = MemoryCloud::new("us-east-1");
    cloud.seed_route_table(RouteTableRecord {
        id: "rt-1".into(),
        vpc_id: "vpc-1".into(),
        tags: Tags::new(),
    });
    cloud.seed_nat_gateway(nat("nat-1", NatGatewayState::Pending), 1_000);
    let cloud = Arc::new(cloud);

    let config = EngineConfig {
        wait: WaitConfig {
            initial_delay_ms: 1,
            max_delay_ms: 1,
            multiplier: 1.0,
            timeout_secs: 0,
        },
        ..EngineConfig::default()
    };
    let report = Engine::new(cloud.clone(), config)
        .apply(&graph_with(route_to_nat()))
        .await
        .unwrap();

    let outcome = report.outcome(&route_addr()).unwrap();
    assert_eq!(outcome.state, TaskState::Failed);
    let err = outcome.error.as_ref().unwrap();
    assert!(matches!(err.root(), ProvisionerError::DependencyTimeout { .. }));
    assert!(err.is_retryable());
    assert_eq!(cloud.mutation_count(), 0);
}

#[tokio::test]
async fn warn_only_route_reports_but_does_not_replace() {
    let cloud = cloud();
    cloud.seed_route(route_row("nat-2", LiveRouteState::Active));

    let report = Engine::new(cloud.clone(), fast_config())
        .apply(&graph_with(route_to_nat().with_lifecycle(Lifecycle::WarnOnly)))
        .await
        .unwrap();

    let outcome = report.outcome(&route_addr()).unwrap();
    assert_eq!(outcome.state, TaskState::SkippedByPolicy);
    assert!(outcome.changes.contains("target"));
    assert_eq!(cloud.mutation_count(), 0);
}
