use cirrus_cloud::model::{CreateInternetGateway, Tags};
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
pub struct InternetGatewayState {
    pub id: Option<String>,
    pub vpc_id: Option<String>,
}

/// An internet gateway attached to a VPC.
#[derive(Debug, Clone)]
pub struct InternetGateway {
    addr: TaskAddr,
    lifecycle: Lifecycle,
    vpc: Option<TaskAddr>,
    shared_id: Option<String>,
    tags: Tags,
}

impl InternetGateway {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            tags: name_tags(&name),
            addr: TaskAddr::internet_gateway(name),
            lifecycle: Lifecycle::Sync,
            vpc: None,
            shared_id: None,
        }
    }

    pub fn vpc(mut self, vpc: TaskAddr) -> Self {
        self.vpc = Some(vpc);
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

impl Task for InternetGateway {
    type State = InternetGatewayState;

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

    fn resolve(&self, ids: &Identifiers) -> Result<InternetGatewayState, ProvisionerError> {
        Ok(InternetGatewayState {
            id: self.shared_id.clone(),
            vpc_id: self.vpc.as_ref().map(|vpc| ids.id(vpc)).transpose()?,
        })
    }

    fn find<'a>(
        &'a self,
        ctx: &'a Context<'a>,
        desired: &'a InternetGatewayState,
    ) -> BoxFuture<'a, Result<Option<InternetGatewayState>, ProvisionerError>> {
        Box::pin(async move {
            let api = require(
                ctx.cloud,
                Capability::InternetGateways,
                ctx.cloud.internet_gateways(),
            )?;
            let filter = lookup_filter(desired.id.as_ref(), &self.tags);
            let found = api
                .describe_internet_gateways(&filter)
                .await
                .map_err(|e| {
                    ProvisionerError::cloud_api(&self.addr, "DescribeInternetGateways", e)
                })?;

            Ok(expect_unique(&self.addr, found)?.map(|igw| InternetGatewayState {
                id: Some(igw.id),
                vpc_id: igw.vpc_id,
            }))
        })
    }

    fn identifier(&self, state: &InternetGatewayState) -> Option<String> {
        state.id.clone()
    }

    fn check_changes(
        &self,
        actual: Option<&InternetGatewayState>,
        desired: &InternetGatewayState,
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
        actual: Option<&'a InternetGatewayState>,
        desired: &'a InternetGatewayState,
        _changes: &'a Changes,
    ) -> BoxFuture<'a, Result<Rendered, ProvisionerError>> {
        Box::pin(async move {
            if actual.is_some() {
                return Ok(Rendered::unchanged());
            }

            let vpc_id = desired.vpc_id.clone().ok_or_else(|| required_field("vpc"))?;
            tracing::info!(addr = %self.addr, vpc_id = %vpc_id, "creating internet gateway");

            let request = CloudRequest::CreateInternetGateway(CreateInternetGateway {
                vpc_id,
                tags: self.tags.clone(),
            });
            let outcome = target
                .apply(&self.addr, request)
                .await?
                .ensure_applied(&self.addr, "CreateInternetGateway")?;
            Ok(Rendered::created(outcome.id))
        })
    }
}
