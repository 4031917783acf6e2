use cirrus_cloud::model::CLUSTER_TAG;
use serde::{Deserialize, Serialize};

use crate::addr::TaskAddr;
use crate::error::ProvisionerError;
use crate::graph::TaskGraph;
use crate::tasks::{InternetGateway, NatGateway, Route, RouteTable, Vpc};

/// Destination block of every default route.
pub const DEFAULT_ROUTE: &str = "0.0.0.0/0";

/// The network layout of one cluster.
///
/// This is the single source of truth for the graph: every task the
/// engine runs is declared by [`ClusterTopology::build_graph`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterTopology {
    /// Cluster name; also the VPC and gateway task names.
    pub name: String,
    /// CIDR block for a VPC this cluster creates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_cidr: Option<String>,
    /// Existing VPC to build into instead of creating one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_vpc_id: Option<String>,
    /// Existing internet gateway of the shared VPC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_internet_gateway_id: Option<String>,
    #[serde(default)]
    pub zones: Vec<ZoneTopology>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneTopology {
    /// e.g. "us-east-1a"
    pub name: String,
    pub egress: Egress,
}

/// How private subnets in a zone reach the internet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Egress {
    /// Create a NAT gateway in `subnet_id` with elastic IP `allocation_id`.
    Nat {
        subnet_id: String,
        allocation_id: String,
    },
    /// Route through a NAT gateway owned elsewhere.
    SharedNat { nat_gateway_id: String },
    /// Route straight to the cluster's internet gateway.
    InternetGateway,
}

impl ClusterTopology {
    pub fn vpc_addr(&self) -> TaskAddr {
        TaskAddr::vpc(&self.name)
    }

    pub fn internet_gateway_addr(&self) -> TaskAddr {
        TaskAddr::internet_gateway(&self.name)
    }

    pub fn public_route_table_addr(&self) -> TaskAddr {
        TaskAddr::route_table(format!("public.{}", self.name))
    }

    pub fn private_route_table_addr(&self, zone: &str) -> TaskAddr {
        TaskAddr::route_table(format!("private-{zone}.{}", self.name))
    }

    pub fn nat_gateway_addr(&self, zone: &str) -> TaskAddr {
        TaskAddr::nat_gateway(format!("{zone}.{}", self.name))
    }

    /// Declare every task of the cluster network.
    pub fn build_graph(&self) -> Result<TaskGraph, ProvisionerError> {
        if self.name.trim().is_empty() {
            return Err(ProvisionerError::Config("cluster name must not be empty".into()));
        }

        let cluster = self.name.as_str();
        let mut graph = TaskGraph::new();

        let vpc = Vpc::new(cluster).tag(CLUSTER_TAG, cluster);
        let vpc = match (&self.shared_vpc_id, &self.network_cidr) {
            (Some(id), _) => vpc.shared(id),
            (None, Some(cidr)) => vpc.cidr_block(cidr),
            (None, None) => vpc,
        };
        let vpc = graph.add(vpc)?;

        let igw = InternetGateway::new(cluster)
            .vpc(vpc.clone())
            .tag(CLUSTER_TAG, cluster);
        let igw = match &self.shared_internet_gateway_id {
            Some(id) => igw.shared(id),
            None => igw,
        };
        let igw = graph.add(igw)?;

        let public = self.public_route_table_addr();
        graph.add(
            RouteTable::new(&public.name)
                .vpc(vpc.clone())
                .tag(CLUSTER_TAG, cluster),
        )?;
        graph.add(
            Route::new(format!("{}-default", public.name))
                .route_table(public)
                .destination(DEFAULT_ROUTE)
                .gateway(igw.clone()),
        )?;

        for zone in &self.zones {
            let table = self.private_route_table_addr(&zone.name);
            graph.add(
                RouteTable::new(&table.name)
                    .vpc(vpc.clone())
                    .tag(CLUSTER_TAG, cluster),
            )?;

            let route = Route::new(format!("{}-default", table.name))
                .route_table(table)
                .destination(DEFAULT_ROUTE);

            let route = match &zone.egress {
                Egress::Nat {
                    subnet_id,
                    allocation_id,
                } => {
                    let nat = graph.add(
                        NatGateway::new(self.nat_gateway_addr(&zone.name).name)
                            .subnet_id(subnet_id)
                            .allocation_id(allocation_id)
                            .tag(CLUSTER_TAG, cluster),
                    )?;
                    route.nat_gateway(nat)
                }
                Egress::SharedNat { nat_gateway_id } => {
                    let nat = graph.add(
                        NatGateway::new(self.nat_gateway_addr(&zone.name).name)
                            .shared(nat_gateway_id),
                    )?;
                    route.nat_gateway(nat)
                }
                Egress::InternetGateway => route.gateway(igw.clone()),
            };
            graph.add(route)?;
        }

        tracing::debug!(cluster, tasks = graph.len(), "built cluster task graph");
        Ok(graph)
    }

    pub fn from_json(json: &str) -> Result<Self, ProvisionerError> {
        Ok(serde_json::from_str(json)?)
    }
}
