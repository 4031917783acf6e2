use cirrus_cloud::model::{CreateRouteTable, Tags};
use cirrus_cloud::{require, Capability};
use serde::Serialize;

use super::{lookup_filter, name_tags};
use crate::addr::TaskAddr;
use crate::drift::Changes;
use crate::error::{required_field, ProvisionerError};
use crate::lifecycle::Lifecycle;
use crate::target::{CloudRequest, Target};
use crate::task::{expect_unique, BoxFuture, Context, Identifiers, Rendered, Task};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RouteTableState {
    pub id: Option<String>,
    pub vpc_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    addr: TaskAddr,
    lifecycle: Lifecycle,
    vpc: Option<TaskAddr>,
    shared_id: Option<String>,
    tags: Tags,
}

impl RouteTable {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            tags: name_tags(&name),
            addr: TaskAddr::route_table(name),
            lifecycle: Lifecycle::Sync,
            vpc: None,
            shared_id: None,
        }
    }

    pub fn vpc(mut self, vpc: TaskAddr) -> Self {
        self.vpc = Some(vpc);
        self
    }

    /// A table owned elsewhere, e.g. by another cluster in a shared VPC.
    pub fn shared(mut self, id: impl Into<String>) -> Self {
        self.shared_id = Some(id.into());
        self.lifecycle = Lifecycle::ExternallyManaged;
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

impl Task for RouteTable {
    type State = RouteTableState;

    fn addr(&self) -> &TaskAddr {
        &self.addr
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn references(&self) -> Vec<TaskAddr> {
        self.vpc.iter().cloned().collect()
    }

    // Looked up by id or tags, never by VPC.
    fn discovery_references(&self) -> Vec<TaskAddr> {
        Vec::new()
    }

    fn resolve(&self, ids: &Identifiers) -> Result<RouteTableState, ProvisionerError> {
        Ok(RouteTableState {
            id: self.shared_id.clone(),
            vpc_id: self.vpc.as_ref().map(|vpc| ids.id(vpc)).transpose()?,
        })
    }

    fn find<'a>(
        &'a self,
        ctx: &'a Context<'a>,
        desired: &'a RouteTableState,
    ) -> BoxFuture<'a, Result<Option<RouteTableState>, ProvisionerError>> {
        Box::pin(async move {
            let api = require(ctx.cloud, Capability::RouteTables, ctx.cloud.route_tables())?;
            let filter = lookup_filter(desired.id.as_ref(), &self.tags);
            let found = api
                .describe_route_tables(&filter)
                .await
                .map_err(|e| ProvisionerError::cloud_api(&self.addr, "DescribeRouteTables", e))?;

            Ok(expect_unique(&self.addr, found)?.map(|table| RouteTableState {
                id: Some(table.id),
                vpc_id: Some(table.vpc_id),
            }))
        })
    }

    fn identifier(&self, state: &RouteTableState) -> Option<String> {
        state.id.clone()
    }

    fn check_changes(
        &self,
        actual: Option<&RouteTableState>,
        desired: &RouteTableState,
        changes: &Changes,
    ) -> Result<(), ProvisionerError> {
        match actual {
            None if desired.vpc_id.is_none() => Err(required_field("vpc")),
            None => Ok(()),
            Some(_) => changes.reject_immutable(&["vpc_id"]),
        }
    }

    fn render<'a>(
        &'a self,
        target: &'a dyn Target,
        actual: Option<&'a RouteTableState>,
        desired: &'a RouteTableState,
        _changes: &'a Changes,
    ) -> BoxFuture<'a, Result<Rendered, ProvisionerError>> {
        Box::pin(async move {
            if actual.is_some() {
                return Ok(Rendered::unchanged());
            }

            let vpc_id = desired.vpc_id.clone().ok_or_else(|| required_field("vpc"))?;
            tracing::info!(addr = %self.addr, vpc_id = %vpc_id, "creating route table");

            let request = CloudRequest::CreateRouteTable(CreateRouteTable {
                vpc_id,
                tags: self.tags.clone(),
            });
            let outcome = target
                .apply(&self.addr, request)
                .await?
                .ensure_applied(&self.addr, "CreateRouteTable")?;
            Ok(Rendered::created(outcome.id))
        })
    }
}
