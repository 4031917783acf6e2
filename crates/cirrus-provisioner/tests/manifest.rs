//! Cluster topologies end to end against the in-memory cloud.

use std::sync::Arc;

use cirrus_cloud::model::{
    InternetGatewayRecord, NatGatewayRecord, NatGatewayState, RouteTarget, Tags, VpcRecord,
    CLUSTER_TAG,
};
use cirrus_cloud::MemoryCloud;
use cirrus_provisioner::{
    provision, ClusterTopology, Egress, EngineConfig, ProvisionerError, TaskAddr, TaskState,
    ZoneTopology,
};

fn nat_zone(zone: &str) -> ZoneTopology {
    ZoneTopology {
        name: zone.into(),
        egress: Egress::Nat {
            subnet_id: format!("subnet-{zone}"),
            allocation_id: format!("eipalloc-{zone}"),
        },
    }
}

fn topology() -> ClusterTopology {
    ClusterTopology {
        name: "alpha".into(),
        network_cidr: Some("10.0.0.0/16".into()),
        shared_vpc_id: None,
        shared_internet_gateway_id: None,
        zones: vec![nat_zone("us-east-1a"), nat_zone("us-east-1b")],
    }
}

#[test]
fn graph_declares_one_table_and_route_per_zone() {
    let graph = topology().build_graph().unwrap();

    // vpc, igw, public table + route, and per zone: table, nat, route.
    assert_eq!(graph.len(), 10);
    assert!(graph.contains(&TaskAddr::route_table("private-us-east-1b.alpha")));
    assert!(graph.contains(&TaskAddr::nat_gateway("us-east-1a.alpha")));
    assert!(graph.contains(&TaskAddr::route("private-us-east-1a.alpha-default")));

    let order = graph.execution_order().unwrap();
    assert_eq!(order[0], TaskAddr::vpc("alpha"));
}

#[test]
fn empty_cluster_name_is_rejected() {
    let topology = ClusterTopology {
        name: "  ".into(),
        ..topology()
    };
    assert!(matches!(
        topology.build_graph(),
        Err(ProvisionerError::Config(_))
    ));
}

#[test]
fn topology_parses_from_json() {
    let topology = ClusterTopology::from_json(
        r#"{
            "name": "alpha",
            "shared_vpc_id": "vpc-123",
            "zones": [
                { "name": "us-east-1a", "egress": { "type": "shared_nat", "nat_gateway_id": "nat-9" } },
                { "name": "us-east-1b", "egress": { "type": "internet_gateway" } }
            ]
        }"#,
    )
    .unwrap();

    assert_eq!(topology.shared_vpc_id.as_deref(), Some("vpc-123"));
    assert_eq!(topology.network_cidr, None);
    assert_eq!(
        topology.zones[0].egress,
        Egress::SharedNat {
            nat_gateway_id: "nat-9".into()
        }
    );
    assert_eq!(topology.zones[1].egress, Egress::InternetGateway);
}

#[tokio::test]
async fn provisions_then_converges() {
    let cloud = Arc::new(MemoryCloud::new("us-east-1"));
    let topology = topology();

    let report = provision(cloud.clone(), EngineConfig::default(), &topology)
        .await
        .unwrap();
    assert_eq!(report.count(TaskState::Done), 10);

    let vpcs = cloud.vpcs_snapshot();
    assert_eq!(vpcs.len(), 1);
    assert_eq!(vpcs[0].tags.get(CLUSTER_TAG).map(String::as_str), Some("alpha"));

    let routes = cloud.routes_snapshot();
    assert_eq!(routes.len(), 3);
    assert_eq!(
        routes
            .iter()
            .filter(|r| matches!(r.target(), Some(RouteTarget::NatGateway(_))))
            .count(),
        2
    );

    // A second run finds everything in place.
    let mutations = cloud.mutation_count();
    let again = provision(cloud.clone(), EngineConfig::default(), &topology)
        .await
        .unwrap();

    assert_eq!(again.count(TaskState::NoOp), 10);
    assert_eq!(cloud.mutation_count(), mutations);
}

#[tokio::test]
async fn builds_into_shared_network() {
    let cloud = MemoryCloud::new("us-east-1");
    cloud.seed_vpc(VpcRecord {
        id: "vpc-shared".into(),
        cidr_block: "10.0.0.0/16".into(),
        tags: Tags::new(),
    });
    cloud.seed_internet_gateway(InternetGatewayRecord {
        id: "igw-shared".into(),
        vpc_id: Some("vpc-shared".into()),
        tags: Tags::new(),
    });
    cloud.seed_nat_gateway(
        NatGatewayRecord {
            id: "nat-shared".into(),
            subnet_id: "subnet-x".into(),
            allocation_id: Some("eipalloc-x".into()),
            state: NatGatewayState::Available,
            tags: Tags::new(),
        },
        0,
    );
    let cloud = Arc::new(cloud);

    let topology = ClusterTopology {
        name: "beta".into(),
        network_cidr: None,
        shared_vpc_id: Some("vpc-shared".into()),
        shared_internet_gateway_id: Some("igw-shared".into()),
        zones: vec![ZoneTopology {
            name: "us-east-1a".into(),
            egress: Egress::SharedNat {
                nat_gateway_id: "nat-shared".into(),
            },
        }],
    };

    let report = provision(cloud.clone(), EngineConfig::default(), &topology)
        .await
        .unwrap();

    assert_eq!(
        report.outcome(&TaskAddr::vpc("beta")).unwrap().identifier.as_deref(),
        Some("vpc-shared")
    );
    let ops = cloud.operations();
    assert!(!ops.contains(&"CreateVpc"));
    assert!(!ops.contains(&"CreateInternetGateway"));
    assert!(!ops.contains(&"CreateNatGateway"));
    assert_eq!(ops.iter().filter(|op| **op == "CreateRouteTable").count(), 2);

    let private = cloud
        .routes_snapshot()
        .into_iter()
        .find(|r| r.target() == Some(RouteTarget::NatGateway("nat-shared".into())));
    assert!(private.is_some());
}

#[tokio::test]
async fn provision_surfaces_the_halting_error() {
    let cloud = MemoryCloud::new("us-east-1");
    cloud.fail_operation("CreateNatGateway");
    let cloud = Arc::new(cloud);

    let err = provision(cloud.clone(), EngineConfig::default(), &topology())
        .await
        .unwrap_err();

    assert!(matches!(
        err.root(),
        ProvisionerError::CloudApi {
            operation: "CreateNatGateway",
            ..
        }
    ));
    assert!(cloud
        .routes_snapshot()
        .iter()
        .all(|r| !matches!(r.target(), Some(RouteTarget::NatGateway(_)))));
}
