use cirrus_cloud::model::{CreateVpc, Tags};
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
pub struct VpcState {
    pub id: Option<String>,
    pub cidr_block: Option<String>,
}

/// A VPC, created from a CIDR block or adopted by identifier.
#[derive(Debug, Clone)]
pub struct Vpc {
    addr: TaskAddr,
    lifecycle: Lifecycle,
    cidr_block: Option<String>,
    shared_id: Option<String>,
    tags: Tags,
}

impl Vpc {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            tags: name_tags(&name),
            addr: TaskAddr::vpc(name),
            lifecycle: Lifecycle::Sync,
            cidr_block: None,
            shared_id: None,
        }
    }

    pub fn cidr_block(mut self, cidr_block: impl Into<String>) -> Self {
        self.cidr_block = Some(cidr_block.into());
        self
    }

    /// An existing VPC owned elsewhere. Only its identifier is used.
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

impl Task for Vpc {
    type State = VpcState;

    fn addr(&self) -> &TaskAddr {
        &self.addr
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn references(&self) -> Vec<TaskAddr> {
        Vec::new()
    }

    fn resolve(&self, _ids: &Identifiers) -> Result<VpcState, ProvisionerError> {
        Ok(VpcState {
            id: self.shared_id.clone(),
            cidr_block: self.cidr_block.clone(),
        })
    }

    fn find<'a>(
        &'a self,
        ctx: &'a Context<'a>,
        desired: &'a VpcState,
    ) -> BoxFuture<'a, Result<Option<VpcState>, ProvisionerError>> {
        Box::pin(async move {
            let api = require(ctx.cloud, Capability::Vpcs, ctx.cloud.vpcs())?;
            let filter = lookup_filter(desired.id.as_ref(), &self.tags);
            let found = api
                .describe_vpcs(&filter)
                .await
                .map_err(|e| ProvisionerError::cloud_api(&self.addr, "DescribeVpcs", e))?;

            Ok(expect_unique(&self.addr, found)?.map(|vpc| VpcState {
                id: Some(vpc.id),
                cidr_block: Some(vpc.cidr_block),
            }))
        })
    }

    fn identifier(&self, state: &VpcState) -> Option<String> {
        state.id.clone()
    }

    fn check_changes(
        &self,
        actual: Option<&VpcState>,
        desired: &VpcState,
        changes: &Changes,
    ) -> Result<(), ProvisionerError> {
        match actual {
            None if desired.cidr_block.is_none() => Err(required_field("cidr_block")),
            None => Ok(()),
            Some(_) => changes.reject_immutable(&["cidr_block"]),
        }
    }

    fn render<'a>(
        &'a self,
        target: &'a dyn Target,
        actual: Option<&'a VpcState>,
        desired: &'a VpcState,
        _changes: &'a Changes,
    ) -> BoxFuture<'a, Result<Rendered, ProvisionerError>> {
        Box::pin(async move {
            if actual.is_some() {
                // Nothing on a VPC is mutable.
                return Ok(Rendered::unchanged());
            }

            let cidr_block = desired
                .cidr_block
                .clone()
                .ok_or_else(|| required_field("cidr_block"))?;
            tracing::info!(addr = %self.addr, cidr_block = %cidr_block, "creating VPC");

            let request = CloudRequest::CreateVpc(CreateVpc {
                cidr_block,
                tags: self.tags.clone(),
            });
            let outcome = target
                .apply(&self.addr, request)
                .await?
                .ensure_applied(&self.addr, "CreateVpc")?;
            Ok(Rendered::created(outcome.id))
        })
    }
}
