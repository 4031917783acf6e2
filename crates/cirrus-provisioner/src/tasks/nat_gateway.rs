use cirrus_cloud::model::{CreateNatGateway, Tags};
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
pub struct NatGatewayState {
    pub id: Option<String>,
    pub subnet_id: Option<String>,
    pub allocation_id: Option<String>,
}

/// A NAT gateway in a public subnet, fronted by an elastic IP allocation.
///
/// Creation returns before the gateway is usable; routes targeting it wait
/// for it to become available.
#[derive(Debug, Clone)]
pub struct NatGateway {
    addr: TaskAddr,
    lifecycle: Lifecycle,
    subnet_id: Option<String>,
    allocation_id: Option<String>,
    shared_id: Option<String>,
    tags: Tags,
}

impl NatGateway {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            tags: name_tags(&name),
            addr: TaskAddr::nat_gateway(name),
            lifecycle: Lifecycle::Sync,
            subnet_id: None,
            allocation_id: None,
            shared_id: None,
        }
    }

    pub fn subnet_id(mut self, subnet_id: impl Into<String>) -> Self {
        self.subnet_id = Some(subnet_id.into());
        self
    }

    pub fn allocation_id(mut self, allocation_id: impl Into<String>) -> Self {
        self.allocation_id = Some(allocation_id.into());
        self
    }

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

impl Task for NatGateway {
    type State = NatGatewayState;

    fn addr(&self) -> &TaskAddr {
        &self.addr
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn references(&self) -> Vec<TaskAddr> {
        Vec::new()
    }

    fn resolve(&self, _ids: &Identifiers) -> Result<NatGatewayState, ProvisionerError> {
        Ok(NatGatewayState {
            id: self.shared_id.clone(),
            subnet_id: self.subnet_id.clone(),
            allocation_id: self.allocation_id.clone(),
        })
    }

    fn find<'a>(
        &'a self,
        ctx: &'a Context<'a>,
        desired: &'a NatGatewayState,
    ) -> BoxFuture<'a, Result<Option<NatGatewayState>, ProvisionerError>> {
        Box::pin(async move {
            let api = require(ctx.cloud, Capability::NatGateways, ctx.cloud.nat_gateways())?;
            let filter = lookup_filter(desired.id.as_ref(), &self.tags);
            let found: Vec<_> = api
                .describe_nat_gateways(&filter)
                .await
                .map_err(|e| ProvisionerError::cloud_api(&self.addr, "DescribeNatGateways", e))?
                .into_iter()
                .filter(|nat| !nat.state.is_gone())
                .collect();

            Ok(expect_unique(&self.addr, found)?.map(|nat| {
                tracing::debug!(addr = %self.addr, id = %nat.id, state = %nat.state, "found NAT gateway");
                NatGatewayState {
                    id: Some(nat.id),
                    subnet_id: Some(nat.subnet_id),
                    allocation_id: nat.allocation_id,
                }
            }))
        })
    }

    fn identifier(&self, state: &NatGatewayState) -> Option<String> {
        state.id.clone()
    }

    fn check_changes(
        &self,
        actual: Option<&NatGatewayState>,
        desired: &NatGatewayState,
        changes: &Changes,
    ) -> Result<(), ProvisionerError> {
        match actual {
            None => {
                if desired.subnet_id.is_none() {
                    return Err(required_field("subnet_id"));
                }
                if desired.allocation_id.is_none() {
                    return Err(required_field("allocation_id"));
                }
                Ok(())
            }
            Some(_) => changes.reject_immutable(&["subnet_id", "allocation_id"]),
        }
    }

    fn render<'a>(
        &'a self,
        target: &'a dyn Target,
        actual: Option<&'a NatGatewayState>,
        desired: &'a NatGatewayState,
        _changes: &'a Changes,
    ) -> BoxFuture<'a, Result<Rendered, ProvisionerError>> {
        Box::pin(async move {
            if actual.is_some() {
                return Ok(Rendered::unchanged());
            }

            let subnet_id = desired
                .subnet_id
                .clone()
                .ok_or_else(|| required_field("subnet_id"))?;
            let allocation_id = desired
                .allocation_id
                .clone()
                .ok_or_else(|| required_field("allocation_id"))?;
            tracing::info!(
                addr = %self.addr,
                subnet_id = %subnet_id,
                allocation_id = %allocation_id,
                "creating NAT gateway"
            );

            let request = CloudRequest::CreateNatGateway(CreateNatGateway {
                subnet_id,
                allocation_id,
                tags: self.tags.clone(),
            });
            let outcome = target
                .apply(&self.addr, request)
                .await?
                .ensure_applied(&self.addr, "CreateNatGateway")?;
            Ok(Rendered::created(outcome.id))
        })
    }
}
