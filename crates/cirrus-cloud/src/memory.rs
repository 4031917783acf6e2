//! In-memory cloud backend.
//!
//! Behaves like a small, strict EC2: creates validate that referenced
//! objects exist, duplicate routes are rejected, and NAT gateways can be
//! made to sit in `pending` for a number of describes. Every call is
//! recorded so callers can assert on what was (or was not) mutated.

use std::collections::HashSet;
use std::future::ready;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::capability::{
    BoxFuture, Cloud, InternetGatewayApi, NatGatewayApi, RouteApi, RouteTableApi, StatusApi,
    VpcApi,
};
use crate::error::CloudError;
use crate::model::{
    ApiIngressStatus, Capability, CloudKind, Cluster, ClusterStatus, CreateInternetGateway,
    CreateNatGateway, CreateRouteTable, CreateVpc, InternetGatewayRecord, NatGatewayRecord,
    NatGatewayState, ResourceFilter, RouteFilter, RouteMutation, RouteRecord, RouteRequest,
    RouteState, RouteTableRecord, RouteTarget, VpcRecord,
};

/// One recorded provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudCall {
    pub operation: &'static str,
    pub mutating: bool,
}

struct NatGatewayEntry {
    record: NatGatewayRecord,
    polls_remaining: u32,
}

#[derive(Default)]
struct Inner {
    vpcs: Vec<VpcRecord>,
    internet_gateways: Vec<InternetGatewayRecord>,
    route_tables: Vec<RouteTableRecord>,
    nat_gateways: Vec<NatGatewayEntry>,
    routes: Vec<RouteRecord>,
    next_id: u32,
    nat_pending_polls: u32,
    reject_mutations: bool,
    failing: HashSet<&'static str>,
    calls: Vec<CloudCall>,
    ingress: Vec<ApiIngressStatus>,
    cluster_status: Option<ClusterStatus>,
}

impl Inner {
    fn begin(&mut self, operation: &'static str, mutating: bool) -> Result<(), CloudError> {
        self.calls.push(CloudCall {
            operation,
            mutating,
        });
        if self.failing.contains(operation) {
            return Err(CloudError::api(operation, "injected failure"));
        }
        Ok(())
    }

    fn allocate(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{:04}", self.next_id)
    }

    fn has_vpc(&self, id: &str) -> bool {
        self.vpcs.iter().any(|v| v.id == id)
    }

    fn target_exists(&self, target: &RouteTarget) -> bool {
        match target {
            RouteTarget::Gateway(id) => self.internet_gateways.iter().any(|g| &g.id == id),
            RouteTarget::NatGateway(id) => self
                .nat_gateways
                .iter()
                .any(|n| &n.record.id == id && !n.record.state.is_gone()),
        }
    }
}

pub struct MemoryCloud {
    region: String,
    disabled: HashSet<Capability>,
    inner: Mutex<Inner>,
}

impl MemoryCloud {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            disabled: HashSet::new(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Drop a capability, as a backend that lacks that resource family.
    pub fn without(mut self, capability: Capability) -> Self {
        self.disabled.insert(capability);
        self
    }

    /// NAT gateways created from now on report `pending` until they have
    /// been described `polls` times.
    pub fn with_nat_pending_polls(self, polls: u32) -> Self {
        self.lock().nat_pending_polls = polls;
        self
    }

    /// Route mutations return `applied = false` without changing anything.
    pub fn reject_mutations(&self, reject: bool) {
        self.lock().reject_mutations = reject;
    }

    /// Make every future call to `operation` fail with an API error.
    pub fn fail_operation(&self, operation: &'static str) {
        self.lock().failing.insert(operation);
    }

    pub fn seed_vpc(&self, record: VpcRecord) {
        self.lock().vpcs.push(record);
    }

    pub fn seed_internet_gateway(&self, record: InternetGatewayRecord) {
        self.lock().internet_gateways.push(record);
    }

    pub fn seed_route_table(&self, record: RouteTableRecord) {
        self.lock().route_tables.push(record);
    }

    pub fn seed_nat_gateway(&self, record: NatGatewayRecord, polls_until_available: u32) {
        self.lock().nat_gateways.push(NatGatewayEntry {
            record,
            polls_remaining: polls_until_available,
        });
    }

    /// Insert a route row as-is. Duplicates are allowed here so callers can
    /// reproduce inconsistent live state.
    pub fn seed_route(&self, record: RouteRecord) {
        self.lock().routes.push(record);
    }

    pub fn set_api_ingress(&self, hostnames: &[&str]) {
        self.lock().ingress = hostnames
            .iter()
            .map(|h| ApiIngressStatus {
                hostname: h.to_string(),
            })
            .collect();
    }

    pub fn set_cluster_status(&self, status: Option<ClusterStatus>) {
        self.lock().cluster_status = status;
    }

    pub fn calls(&self) -> Vec<CloudCall> {
        self.lock().calls.clone()
    }

    pub fn operations(&self) -> Vec<&'static str> {
        self.lock().calls.iter().map(|c| c.operation).collect()
    }

    pub fn mutation_count(&self) -> usize {
        self.lock().calls.iter().filter(|c| c.mutating).count()
    }

    pub fn routes_snapshot(&self) -> Vec<RouteRecord> {
        self.lock().routes.clone()
    }

    pub fn vpcs_snapshot(&self) -> Vec<VpcRecord> {
        self.lock().vpcs.clone()
    }

    pub fn nat_gateways_snapshot(&self) -> Vec<NatGatewayRecord> {
        self.lock()
            .nat_gateways
            .iter()
            .map(|n| n.record.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enabled(&self, capability: Capability) -> bool {
        !self.disabled.contains(&capability)
    }

    fn run_describe_vpcs(&self, filter: &ResourceFilter) -> Result<Vec<VpcRecord>, CloudError> {
        let mut inner = self.lock();
        inner.begin("DescribeVpcs", false)?;
        Ok(inner
            .vpcs
            .iter()
            .filter(|v| filter.matches(&v.id, &v.tags))
            .cloned()
            .collect())
    }

    fn run_create_vpc(&self, input: &CreateVpc) -> Result<VpcRecord, CloudError> {
        let mut inner = self.lock();
        inner.begin("CreateVpc", true)?;
        let record = VpcRecord {
            id: inner.allocate("vpc"),
            cidr_block: input.cidr_block.clone(),
            tags: input.tags.clone(),
        };
        inner.vpcs.push(record.clone());
        Ok(record)
    }

    fn run_describe_internet_gateways(
        &self,
        filter: &ResourceFilter,
    ) -> Result<Vec<InternetGatewayRecord>, CloudError> {
        let mut inner = self.lock();
        inner.begin("DescribeInternetGateways", false)?;
        Ok(inner
            .internet_gateways
            .iter()
            .filter(|g| filter.matches(&g.id, &g.tags))
            .cloned()
            .collect())
    }

    fn run_create_internet_gateway(
        &self,
        input: &CreateInternetGateway,
    ) -> Result<InternetGatewayRecord, CloudError> {
        let mut inner = self.lock();
        inner.begin("CreateInternetGateway", true)?;
        if !inner.has_vpc(&input.vpc_id) {
            return Err(CloudError::api(
                "CreateInternetGateway",
                format!("vpc {} does not exist", input.vpc_id),
            ));
        }
        let record = InternetGatewayRecord {
            id: inner.allocate("igw"),
            vpc_id: Some(input.vpc_id.clone()),
            tags: input.tags.clone(),
        };
        inner.internet_gateways.push(record.clone());
        Ok(record)
    }

    fn run_describe_route_tables(
        &self,
        filter: &ResourceFilter,
    ) -> Result<Vec<RouteTableRecord>, CloudError> {
        let mut inner = self.lock();
        inner.begin("DescribeRouteTables", false)?;
        Ok(inner
            .route_tables
            .iter()
            .filter(|t| filter.matches(&t.id, &t.tags))
            .cloned()
            .collect())
    }

    fn run_create_route_table(
        &self,
        input: &CreateRouteTable,
    ) -> Result<RouteTableRecord, CloudError> {
        let mut inner = self.lock();
        inner.begin("CreateRouteTable", true)?;
        if !inner.has_vpc(&input.vpc_id) {
            return Err(CloudError::api(
                "CreateRouteTable",
                format!("vpc {} does not exist", input.vpc_id),
            ));
        }
        let record = RouteTableRecord {
            id: inner.allocate("rtb"),
            vpc_id: input.vpc_id.clone(),
            tags: input.tags.clone(),
        };
        inner.route_tables.push(record.clone());
        Ok(record)
    }

    fn run_describe_nat_gateways(
        &self,
        filter: &ResourceFilter,
    ) -> Result<Vec<NatGatewayRecord>, CloudError> {
        let mut inner = self.lock();
        inner.begin("DescribeNatGateways", false)?;
        let mut found = Vec::new();
        for entry in inner
            .nat_gateways
            .iter_mut()
            .filter(|n| filter.matches(&n.record.id, &n.record.tags))
        {
            if entry.record.state == NatGatewayState::Pending && entry.polls_remaining > 0 {
                entry.polls_remaining -= 1;
                if entry.polls_remaining == 0 {
                    entry.record.state = NatGatewayState::Available;
                }
            }
            found.push(entry.record.clone());
        }
        Ok(found)
    }

    fn run_create_nat_gateway(
        &self,
        input: &CreateNatGateway,
    ) -> Result<NatGatewayRecord, CloudError> {
        let mut inner = self.lock();
        inner.begin("CreateNatGateway", true)?;
        let polls = inner.nat_pending_polls;
        let record = NatGatewayRecord {
            id: inner.allocate("nat"),
            subnet_id: input.subnet_id.clone(),
            allocation_id: Some(input.allocation_id.clone()),
            state: if polls == 0 {
                NatGatewayState::Available
            } else {
                NatGatewayState::Pending
            },
            tags: input.tags.clone(),
        };
        inner.nat_gateways.push(NatGatewayEntry {
            record: record.clone(),
            polls_remaining: polls,
        });
        Ok(record)
    }

    fn run_describe_routes(&self, filter: &RouteFilter) -> Result<Vec<RouteRecord>, CloudError> {
        let mut inner = self.lock();
        inner.begin("DescribeRoutes", false)?;
        Ok(inner
            .routes
            .iter()
            .filter(|r| {
                r.route_table_id == filter.route_table_id
                    && r.destination_cidr_block == filter.destination_cidr_block
            })
            .cloned()
            .collect())
    }

    fn run_create_route(&self, request: &RouteRequest) -> Result<RouteMutation, CloudError> {
        let mut inner = self.lock();
        inner.begin("CreateRoute", true)?;
        if inner.reject_mutations {
            return Ok(RouteMutation { applied: false });
        }
        if !inner
            .route_tables
            .iter()
            .any(|t| t.id == request.route_table_id)
        {
            return Err(CloudError::api(
                "CreateRoute",
                format!("route table {} does not exist", request.route_table_id),
            ));
        }
        if !inner.target_exists(&request.target) {
            return Err(CloudError::api(
                "CreateRoute",
                format!("route target {:?} does not exist", request.target),
            ));
        }
        if inner.routes.iter().any(|r| {
            r.route_table_id == request.route_table_id
                && r.destination_cidr_block == request.destination_cidr_block
        }) {
            return Err(CloudError::api(
                "CreateRoute",
                format!(
                    "route {} already exists in {}",
                    request.destination_cidr_block, request.route_table_id
                ),
            ));
        }
        inner.routes.push(route_record(request));
        Ok(RouteMutation { applied: true })
    }

    fn run_replace_route(&self, request: &RouteRequest) -> Result<RouteMutation, CloudError> {
        let mut inner = self.lock();
        inner.begin("ReplaceRoute", true)?;
        if inner.reject_mutations {
            return Ok(RouteMutation { applied: false });
        }
        if !inner.target_exists(&request.target) {
            return Err(CloudError::api(
                "ReplaceRoute",
                format!("route target {:?} does not exist", request.target),
            ));
        }
        let Some(existing) = inner.routes.iter_mut().find(|r| {
            r.route_table_id == request.route_table_id
                && r.destination_cidr_block == request.destination_cidr_block
        }) else {
            return Err(CloudError::api(
                "ReplaceRoute",
                format!(
                    "no route {} in {}",
                    request.destination_cidr_block, request.route_table_id
                ),
            ));
        };
        *existing = route_record(request);
        Ok(RouteMutation { applied: true })
    }

    fn run_api_ingress_status(&self) -> Result<Vec<ApiIngressStatus>, CloudError> {
        let mut inner = self.lock();
        inner.begin("GetApiIngressStatus", false)?;
        Ok(inner.ingress.clone())
    }

    fn run_cluster_status(&self) -> Result<Option<ClusterStatus>, CloudError> {
        let mut inner = self.lock();
        inner.begin("FindClusterStatus", false)?;
        Ok(inner.cluster_status.clone())
    }
}

fn route_record(request: &RouteRequest) -> RouteRecord {
    let (gateway_id, nat_gateway_id) = match &request.target {
        RouteTarget::Gateway(id) => (Some(id.clone()), None),
        RouteTarget::NatGateway(id) => (None, Some(id.clone())),
    };
    RouteRecord {
        route_table_id: request.route_table_id.clone(),
        destination_cidr_block: request.destination_cidr_block.clone(),
        gateway_id,
        nat_gateway_id,
        state: RouteState::Active,
    }
}

impl VpcApi for MemoryCloud {
    fn describe_vpcs<'a>(
        &'a self,
        filter: &'a ResourceFilter,
    ) -> BoxFuture<'a, Result<Vec<VpcRecord>, CloudError>> {
        Box::pin(ready(self.run_describe_vpcs(filter)))
    }

    fn create_vpc<'a>(
        &'a self,
        input: &'a CreateVpc,
    ) -> BoxFuture<'a, Result<VpcRecord, CloudError>> {
        Box::pin(ready(self.run_create_vpc(input)))
    }
}

impl InternetGatewayApi for MemoryCloud {
    fn describe_internet_gateways<'a>(
        &'a self,
        filter: &'a ResourceFilter,
    ) -> BoxFuture<'a, Result<Vec<InternetGatewayRecord>, CloudError>> {
        Box::pin(ready(self.run_describe_internet_gateways(filter)))
    }

    fn create_internet_gateway<'a>(
        &'a self,
        input: &'a CreateInternetGateway,
    ) -> BoxFuture<'a, Result<InternetGatewayRecord, CloudError>> {
        Box::pin(ready(self.run_create_internet_gateway(input)))
    }
}

impl RouteTableApi for MemoryCloud {
    fn describe_route_tables<'a>(
        &'a self,
        filter: &'a ResourceFilter,
    ) -> BoxFuture<'a, Result<Vec<RouteTableRecord>, CloudError>> {
        Box::pin(ready(self.run_describe_route_tables(filter)))
    }

    fn create_route_table<'a>(
        &'a self,
        input: &'a CreateRouteTable,
    ) -> BoxFuture<'a, Result<RouteTableRecord, CloudError>> {
        Box::pin(ready(self.run_create_route_table(input)))
    }
}

impl NatGatewayApi for MemoryCloud {
    fn describe_nat_gateways<'a>(
        &'a self,
        filter: &'a ResourceFilter,
    ) -> BoxFuture<'a, Result<Vec<NatGatewayRecord>, CloudError>> {
        Box::pin(ready(self.run_describe_nat_gateways(filter)))
    }

    fn create_nat_gateway<'a>(
        &'a self,
        input: &'a CreateNatGateway,
    ) -> BoxFuture<'a, Result<NatGatewayRecord, CloudError>> {
        Box::pin(ready(self.run_create_nat_gateway(input)))
    }
}

impl RouteApi for MemoryCloud {
    fn describe_routes<'a>(
        &'a self,
        filter: &'a RouteFilter,
    ) -> BoxFuture<'a, Result<Vec<RouteRecord>, CloudError>> {
        Box::pin(ready(self.run_describe_routes(filter)))
    }

    fn create_route<'a>(
        &'a self,
        request: &'a RouteRequest,
    ) -> BoxFuture<'a, Result<RouteMutation, CloudError>> {
        Box::pin(ready(self.run_create_route(request)))
    }

    fn replace_route<'a>(
        &'a self,
        request: &'a RouteRequest,
    ) -> BoxFuture<'a, Result<RouteMutation, CloudError>> {
        Box::pin(ready(self.run_replace_route(request)))
    }
}

impl StatusApi for MemoryCloud {
    fn api_ingress_status<'a>(
        &'a self,
        _cluster: &'a Cluster,
    ) -> BoxFuture<'a, Result<Vec<ApiIngressStatus>, CloudError>> {
        Box::pin(ready(self.run_api_ingress_status()))
    }

    fn cluster_status<'a>(
        &'a self,
        _cluster: &'a Cluster,
    ) -> BoxFuture<'a, Result<Option<ClusterStatus>, CloudError>> {
        Box::pin(ready(self.run_cluster_status()))
    }
}

impl Cloud for MemoryCloud {
    fn kind(&self) -> CloudKind {
        CloudKind::Memory
    }

    fn region(&self) -> &str {
        &self.region
    }

    fn vpcs(&self) -> Option<&dyn VpcApi> {
        self.enabled(Capability::Vpcs).then_some(self as &dyn VpcApi)
    }

    fn internet_gateways(&self) -> Option<&dyn InternetGatewayApi> {
        self.enabled(Capability::InternetGateways)
            .then_some(self as &dyn InternetGatewayApi)
    }

    fn route_tables(&self) -> Option<&dyn RouteTableApi> {
        self.enabled(Capability::RouteTables)
            .then_some(self as &dyn RouteTableApi)
    }

    fn nat_gateways(&self) -> Option<&dyn NatGatewayApi> {
        self.enabled(Capability::NatGateways)
            .then_some(self as &dyn NatGatewayApi)
    }

    fn routes(&self) -> Option<&dyn RouteApi> {
        self.enabled(Capability::Routes)
            .then_some(self as &dyn RouteApi)
    }

    fn status(&self) -> Option<&dyn StatusApi> {
        self.enabled(Capability::Status)
            .then_some(self as &dyn StatusApi)
    }
}
