use std::future::Future;
use std::pin::Pin;

use crate::error::CloudError;
use crate::model::{
    ApiIngressStatus, Capability, CloudKind, Cluster, ClusterStatus, CreateInternetGateway,
    CreateNatGateway, CreateRouteTable, CreateVpc, InternetGatewayRecord, NatGatewayRecord,
    ResourceFilter, RouteFilter, RouteMutation, RouteRecord, RouteRequest, RouteTableRecord,
    VpcRecord,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait VpcApi: Send + Sync {
    fn describe_vpcs<'a>(
        &'a self,
        filter: &'a ResourceFilter,
    ) -> BoxFuture<'a, Result<Vec<VpcRecord>, CloudError>>;

    fn create_vpc<'a>(
        &'a self,
        input: &'a CreateVpc,
    ) -> BoxFuture<'a, Result<VpcRecord, CloudError>>;
}

pub trait InternetGatewayApi: Send + Sync {
    fn describe_internet_gateways<'a>(
        &'a self,
        filter: &'a ResourceFilter,
    ) -> BoxFuture<'a, Result<Vec<InternetGatewayRecord>, CloudError>>;

    /// Create the gateway and attach it to the requested VPC.
    fn create_internet_gateway<'a>(
        &'a self,
        input: &'a CreateInternetGateway,
    ) -> BoxFuture<'a, Result<InternetGatewayRecord, CloudError>>;
}

pub trait RouteTableApi: Send + Sync {
    fn describe_route_tables<'a>(
        &'a self,
        filter: &'a ResourceFilter,
    ) -> BoxFuture<'a, Result<Vec<RouteTableRecord>, CloudError>>;

    fn create_route_table<'a>(
        &'a self,
        input: &'a CreateRouteTable,
    ) -> BoxFuture<'a, Result<RouteTableRecord, CloudError>>;
}

pub trait NatGatewayApi: Send + Sync {
    fn describe_nat_gateways<'a>(
        &'a self,
        filter: &'a ResourceFilter,
    ) -> BoxFuture<'a, Result<Vec<NatGatewayRecord>, CloudError>>;

    fn create_nat_gateway<'a>(
        &'a self,
        input: &'a CreateNatGateway,
    ) -> BoxFuture<'a, Result<NatGatewayRecord, CloudError>>;
}

pub trait RouteApi: Send + Sync {
    /// Every route row in the filtered table matching the destination block.
    fn describe_routes<'a>(
        &'a self,
        filter: &'a RouteFilter,
    ) -> BoxFuture<'a, Result<Vec<RouteRecord>, CloudError>>;

    fn create_route<'a>(
        &'a self,
        request: &'a RouteRequest,
    ) -> BoxFuture<'a, Result<RouteMutation, CloudError>>;

    fn replace_route<'a>(
        &'a self,
        request: &'a RouteRequest,
    ) -> BoxFuture<'a, Result<RouteMutation, CloudError>>;
}

pub trait StatusApi: Send + Sync {
    fn api_ingress_status<'a>(
        &'a self,
        cluster: &'a Cluster,
    ) -> BoxFuture<'a, Result<Vec<ApiIngressStatus>, CloudError>>;

    fn cluster_status<'a>(
        &'a self,
        cluster: &'a Cluster,
    ) -> BoxFuture<'a, Result<Option<ClusterStatus>, CloudError>>;
}

/// A cloud backend. Each capability accessor returns a handle when the
/// backend supports that resource family and `None` otherwise.
///
/// Implementations must be safe to share across concurrently running tasks.
pub trait Cloud: Send + Sync {
    fn kind(&self) -> CloudKind;

    fn region(&self) -> &str;

    fn vpcs(&self) -> Option<&dyn VpcApi> {
        None
    }

    fn internet_gateways(&self) -> Option<&dyn InternetGatewayApi> {
        None
    }

    fn route_tables(&self) -> Option<&dyn RouteTableApi> {
        None
    }

    fn nat_gateways(&self) -> Option<&dyn NatGatewayApi> {
        None
    }

    fn routes(&self) -> Option<&dyn RouteApi> {
        None
    }

    fn status(&self) -> Option<&dyn StatusApi> {
        None
    }

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Vpcs => self.vpcs().is_some(),
            Capability::InternetGateways => self.internet_gateways().is_some(),
            Capability::RouteTables => self.route_tables().is_some(),
            Capability::NatGateways => self.nat_gateways().is_some(),
            Capability::Routes => self.routes().is_some(),
            Capability::Status => self.status().is_some(),
        }
    }
}

/// Turn a missing capability handle into an explicit error naming both the
/// capability and the backend.
///
/// ```ignore
/// let routes = require(cloud, Capability::Routes, cloud.routes())?;
/// ```
pub fn require<'a, T: ?Sized>(
    cloud: &dyn Cloud,
    capability: Capability,
    handle: Option<&'a T>,
) -> Result<&'a T, CloudError> {
    handle.ok_or(CloudError::Unsupported {
        capability,
        backend: cloud.kind(),
    })
}
