use cirrus_cloud::model::{
    RouteFilter, RouteRecord, RouteRequest, RouteState as LiveRouteState, RouteTarget,
};
use cirrus_cloud::{require, Capability};
use serde::Serialize;

use crate::addr::TaskAddr;
use crate::drift::Changes;
use crate::error::{required_field, ProvisionerError};
use crate::lifecycle::Lifecycle;
use crate::target::{CloudRequest, Readiness, Target};
use crate::task::{expect_unique, BoxFuture, Context, Identifiers, Rendered, Task};

/// A declared route target, by task reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetRef {
    Gateway(TaskAddr),
    NatGateway(TaskAddr),
}

impl TargetRef {
    pub fn addr(&self) -> &TaskAddr {
        match self {
            Self::Gateway(addr) | Self::NatGateway(addr) => addr,
        }
    }

    fn resolve(&self, ids: &Identifiers) -> Result<RouteTarget, ProvisionerError> {
        Ok(match self {
            Self::Gateway(addr) => RouteTarget::Gateway(ids.id(addr)?),
            Self::NatGateway(addr) => RouteTarget::NatGateway(ids.id(addr)?),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RouteState {
    pub route_table_id: Option<String>,
    pub destination_cidr_block: Option<String>,
    pub target: Option<RouteTarget>,
}

/// One route in one route table, keyed by destination block.
///
/// Routes have no identifier of their own. The target may be replaced in
/// place; table and destination are fixed once created.
#[derive(Debug, Clone)]
pub struct Route {
    addr: TaskAddr,
    lifecycle: Lifecycle,
    route_table: Option<TaskAddr>,
    destination_cidr_block: Option<String>,
    targets: Vec<TargetRef>,
}

impl Route {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            addr: TaskAddr::route(name),
            lifecycle: Lifecycle::Sync,
            route_table: None,
            destination_cidr_block: None,
            targets: Vec::new(),
        }
    }

    pub fn route_table(mut self, route_table: TaskAddr) -> Self {
        self.route_table = Some(route_table);
        self
    }

    pub fn destination(mut self, cidr_block: impl Into<String>) -> Self {
        self.destination_cidr_block = Some(cidr_block.into());
        self
    }

    pub fn gateway(mut self, gateway: TaskAddr) -> Self {
        self.targets.push(TargetRef::Gateway(gateway));
        self
    }

    pub fn nat_gateway(mut self, nat_gateway: TaskAddr) -> Self {
        self.targets.push(TargetRef::NatGateway(nat_gateway));
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// The one declared target. Creation validation rejects anything else.
    fn declared_target(&self) -> Result<&TargetRef, ProvisionerError> {
        match self.targets.as_slice() {
            [] => Err(ProvisionerError::MissingTarget),
            [target] => Ok(target),
            [_, _, ..] => Err(ProvisionerError::AmbiguousTarget),
        }
    }
}

fn snapshot(record: RouteRecord, addr: &TaskAddr) -> RouteState {
    let target = match record.state {
        LiveRouteState::Blackhole => {
            tracing::debug!(
                addr = %addr,
                route_table_id = %record.route_table_id,
                destination_cidr_block = %record.destination_cidr_block,
                "route is a blackhole, treating target as unset"
            );
            None
        }
        LiveRouteState::Active => record.target(),
    };
    RouteState {
        route_table_id: Some(record.route_table_id),
        destination_cidr_block: Some(record.destination_cidr_block),
        target,
    }
}

impl Task for Route {
    type State = RouteState;

    fn addr(&self) -> &TaskAddr {
        &self.addr
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn references(&self) -> Vec<TaskAddr> {
        self.route_table
            .iter()
            .chain(self.targets.iter().map(TargetRef::addr))
            .cloned()
            .collect()
    }

    /// Routes are keyed by table and destination; the target is not part
    /// of the lookup.
    fn discovery_references(&self) -> Vec<TaskAddr> {
        self.route_table.iter().cloned().collect()
    }

    fn resolve(&self, ids: &Identifiers) -> Result<RouteState, ProvisionerError> {
        // An invalid target set is reported by validation, not here.
        let target = match self.declared_target() {
            Ok(target) => Some(target.resolve(ids)?),
            Err(_) => None,
        };
        Ok(RouteState {
            route_table_id: self
                .route_table
                .as_ref()
                .map(|table| ids.id(table))
                .transpose()?,
            destination_cidr_block: self.destination_cidr_block.clone(),
            target,
        })
    }

    fn find<'a>(
        &'a self,
        ctx: &'a Context<'a>,
        desired: &'a RouteState,
    ) -> BoxFuture<'a, Result<Option<RouteState>, ProvisionerError>> {
        Box::pin(async move {
            let (Some(route_table_id), Some(destination_cidr_block)) =
                (&desired.route_table_id, &desired.destination_cidr_block)
            else {
                return Ok(None);
            };

            let api = require(ctx.cloud, Capability::Routes, ctx.cloud.routes())?;
            let filter = RouteFilter {
                route_table_id: route_table_id.clone(),
                destination_cidr_block: destination_cidr_block.clone(),
            };
            let found = api
                .describe_routes(&filter)
                .await
                .map_err(|e| ProvisionerError::cloud_api(&self.addr, "DescribeRoutes", e))?;

            Ok(expect_unique(&self.addr, found)?.map(|record| snapshot(record, &self.addr)))
        })
    }

    fn identifier(&self, _state: &RouteState) -> Option<String> {
        None
    }

    fn check_changes(
        &self,
        actual: Option<&RouteState>,
        desired: &RouteState,
        changes: &Changes,
    ) -> Result<(), ProvisionerError> {
        match actual {
            None => {
                if desired.route_table_id.is_none() {
                    return Err(required_field("route_table"));
                }
                if desired.destination_cidr_block.is_none() {
                    return Err(required_field("destination_cidr_block"));
                }
                self.declared_target().map(|_| ())
            }
            Some(_) => changes.reject_immutable(&["route_table_id", "destination_cidr_block"]),
        }
    }

    fn render<'a>(
        &'a self,
        target: &'a dyn Target,
        actual: Option<&'a RouteState>,
        desired: &'a RouteState,
        _changes: &'a Changes,
    ) -> BoxFuture<'a, Result<Rendered, ProvisionerError>> {
        Box::pin(async move {
            let route_table_id = desired
                .route_table_id
                .clone()
                .ok_or_else(|| required_field("route_table"))?;
            let destination_cidr_block = desired
                .destination_cidr_block
                .clone()
                .ok_or_else(|| required_field("destination_cidr_block"))?;
            let Some(route_target) = desired.target.clone() else {
                let err = self.declared_target().err();
                return Err(err.unwrap_or(ProvisionerError::MissingTarget));
            };

            if let RouteTarget::NatGateway(id) = &route_target {
                let readiness = Readiness::NatGatewayAvailable { id: id.clone() };
                target.await_ready(&self.addr, &readiness).await?;
            }

            let request = RouteRequest {
                route_table_id,
                destination_cidr_block,
                target: route_target,
            };
            let (operation, request) = match actual {
                None => {
                    tracing::info!(
                        addr = %self.addr,
                        route_table_id = %request.route_table_id,
                        destination_cidr_block = %request.destination_cidr_block,
                        target = ?request.target,
                        "creating route"
                    );
                    ("CreateRoute", CloudRequest::CreateRoute(request))
                }
                Some(_) => {
                    tracing::info!(
                        addr = %self.addr,
                        route_table_id = %request.route_table_id,
                        destination_cidr_block = %request.destination_cidr_block,
                        target = ?request.target,
                        "replacing route target"
                    );
                    ("ReplaceRoute", CloudRequest::ReplaceRoute(request))
                }
            };

            target
                .apply(&self.addr, request)
                .await?
                .ensure_applied(&self.addr, operation)?;
            Ok(Rendered::unchanged())
        })
    }
}
