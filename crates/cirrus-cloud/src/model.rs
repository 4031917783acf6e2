//! Plain data exchanged with capability providers.
//!
//! These types mirror what a cloud API returns or accepts. They carry raw
//! identifiers only; task-level references live in the provisioner.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub type Tags = BTreeMap<String, String>;

/// Tag key holding the human-readable name of a resource.
pub const NAME_TAG: &str = "Name";

/// Tag key holding the owning cluster's name.
pub const CLUSTER_TAG: &str = "cirrus.io/cluster";

/// Tag key holding the instance role (`control-plane`, `node`).
pub const ROLE_TAG: &str = "cirrus.io/role";

/// Concrete backend behind a [`crate::Cloud`].
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CloudKind {
    Aws,
    Memory,
}

impl fmt::Display for CloudKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloudKind::Aws => write!(f, "aws"),
            CloudKind::Memory => write!(f, "memory"),
        }
    }
}

/// A discrete resource family a backend may or may not support.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Vpcs,
    InternetGateways,
    RouteTables,
    NatGateways,
    Routes,
    Status,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Vpcs => "vpcs",
            Capability::InternetGateways => "internet_gateways",
            Capability::RouteTables => "route_tables",
            Capability::NatGateways => "nat_gateways",
            Capability::Routes => "routes",
            Capability::Status => "status",
        };
        f.write_str(name)
    }
}

/// Lookup filter for tagged resources: match any of `ids` (when given)
/// and all of `tags`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFilter {
    pub ids: Vec<String>,
    pub tags: Tags,
}

impl ResourceFilter {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            ids: vec![id.into()],
            tags: Tags::new(),
        }
    }

    pub fn by_tags(tags: Tags) -> Self {
        Self {
            ids: Vec::new(),
            tags,
        }
    }

    pub fn matches(&self, id: &str, tags: &Tags) -> bool {
        let id_ok = self.ids.is_empty() || self.ids.iter().any(|i| i == id);
        let tags_ok = self
            .tags
            .iter()
            .all(|(k, v)| tags.get(k).is_some_and(|actual| actual == v));
        id_ok && tags_ok
    }
}

// ── VPC ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpcRecord {
    pub id: String,
    pub cidr_block: String,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateVpc {
    pub cidr_block: String,
    pub tags: Tags,
}

// ── Internet gateway ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternetGatewayRecord {
    pub id: String,
    /// VPC the gateway is attached to, if any.
    pub vpc_id: Option<String>,
    pub tags: Tags,
}

/// Create a gateway and attach it to `vpc_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInternetGateway {
    pub vpc_id: String,
    pub tags: Tags,
}

// ── Route table ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTableRecord {
    pub id: String,
    pub vpc_id: String,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRouteTable {
    pub vpc_id: String,
    pub tags: Tags,
}

// ── NAT gateway ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NatGatewayState {
    Pending,
    Available,
    Failed,
    Deleting,
    Deleted,
}

impl NatGatewayState {
    /// Deleted gateways linger in describe output for a while.
    pub fn is_gone(self) -> bool {
        matches!(self, Self::Deleting | Self::Deleted)
    }
}

impl fmt::Display for NatGatewayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Available => "available",
            Self::Failed => "failed",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatGatewayRecord {
    pub id: String,
    pub subnet_id: String,
    pub allocation_id: Option<String>,
    pub state: NatGatewayState,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateNatGateway {
    pub subnet_id: String,
    pub allocation_id: String,
    pub tags: Tags,
}

// ── Route ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteState {
    Active,
    /// The route's target was deleted out-of-band.
    Blackhole,
}

/// Where a route sends traffic. Exactly one target per route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteTarget {
    Gateway(String),
    NatGateway(String),
}

/// A route row as the cloud reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRecord {
    pub route_table_id: String,
    pub destination_cidr_block: String,
    pub gateway_id: Option<String>,
    pub nat_gateway_id: Option<String>,
    pub state: RouteState,
}

impl RouteRecord {
    /// The live target, or `None` when the route is a blackhole.
    pub fn target(&self) -> Option<RouteTarget> {
        if self.state == RouteState::Blackhole {
            return None;
        }
        match (&self.gateway_id, &self.nat_gateway_id) {
            (Some(gw), None) => Some(RouteTarget::Gateway(gw.clone())),
            (None, Some(nat)) => Some(RouteTarget::NatGateway(nat.clone())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteFilter {
    pub route_table_id: String,
    pub destination_cidr_block: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub route_table_id: String,
    pub destination_cidr_block: String,
    pub target: RouteTarget,
}

/// Response to a route mutation. `applied == false` is a logical failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteMutation {
    pub applied: bool,
}

// ── Status ───────────────────────────────────────────────────────────────────

/// Descriptor of a cluster whose status is being discovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    pub cloud: CloudKind,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiIngressStatus {
    pub hostname: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub control_plane_instances: usize,
    pub control_plane_healthy: bool,
}
