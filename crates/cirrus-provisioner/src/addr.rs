use std::fmt;

use cirrus_cloud::Capability;
use serde::{Deserialize, Serialize};

/// The kinds of infrastructure a task can declare.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Vpc,
    InternetGateway,
    RouteTable,
    NatGateway,
    Route,
}

impl ResourceKind {
    /// Cloud capability a task of this kind needs.
    pub fn capability(self) -> Capability {
        match self {
            Self::Vpc => Capability::Vpcs,
            Self::InternetGateway => Capability::InternetGateways,
            Self::RouteTable => Capability::RouteTables,
            Self::NatGateway => Capability::NatGateways,
            Self::Route => Capability::Routes,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vpc => "vpc",
            Self::InternetGateway => "internet_gateway",
            Self::RouteTable => "route_table",
            Self::NatGateway => "nat_gateway",
            Self::Route => "route",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite key for addressing a task in the graph.
///
/// Two tasks of the same kind but different names (e.g. one private route
/// table per zone) have distinct addresses. References between tasks are
/// expressed as addresses.
#[derive(Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskAddr {
    pub kind: ResourceKind,
    pub name: String,
}

impl TaskAddr {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn vpc(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Vpc, name)
    }

    pub fn internet_gateway(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::InternetGateway, name)
    }

    pub fn route_table(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::RouteTable, name)
    }

    pub fn nat_gateway(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::NatGateway, name)
    }

    pub fn route(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Route, name)
    }
}

impl fmt::Display for TaskAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}
