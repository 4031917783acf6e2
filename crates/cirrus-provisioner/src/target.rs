//! Where rendered changes go: the live cloud, or a recorded plan.

use std::sync::{Arc, Mutex, MutexGuard};

use cirrus_cloud::model::{
    CreateInternetGateway, CreateNatGateway, CreateRouteTable, CreateVpc, NatGatewayState,
    ResourceFilter, RouteRequest,
};
use cirrus_cloud::{require, BoxFuture, Capability, Cloud};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::addr::TaskAddr;
use crate::error::ProvisionerError;
use crate::plan::{Plan, PlanAction, PlanRecord};
use crate::wait::{poll_until, Probe, WaitConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetMode {
    Apply,
    Plan,
}

/// A mutation a task asks its target to perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", content = "request", rename_all = "snake_case")]
pub enum CloudRequest {
    CreateVpc(CreateVpc),
    CreateInternetGateway(CreateInternetGateway),
    CreateRouteTable(CreateRouteTable),
    CreateNatGateway(CreateNatGateway),
    CreateRoute(RouteRequest),
    ReplaceRoute(RouteRequest),
}

impl CloudRequest {
    /// Provider operation name, as used in logs and errors.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::CreateVpc(_) => "CreateVpc",
            Self::CreateInternetGateway(_) => "CreateInternetGateway",
            Self::CreateRouteTable(_) => "CreateRouteTable",
            Self::CreateNatGateway(_) => "CreateNatGateway",
            Self::CreateRoute(_) => "CreateRoute",
            Self::ReplaceRoute(_) => "ReplaceRoute",
        }
    }

    pub fn capability(&self) -> Capability {
        match self {
            Self::CreateVpc(_) => Capability::Vpcs,
            Self::CreateInternetGateway(_) => Capability::InternetGateways,
            Self::CreateRouteTable(_) => Capability::RouteTables,
            Self::CreateNatGateway(_) => Capability::NatGateways,
            Self::CreateRoute(_) | Self::ReplaceRoute(_) => Capability::Routes,
        }
    }

    pub fn action(&self) -> PlanAction {
        match self {
            Self::ReplaceRoute(_) => PlanAction::Replace,
            _ => PlanAction::Create,
        }
    }

    /// Whether the created object gets an identifier of its own.
    pub fn assigns_identifier(&self) -> bool {
        !matches!(self, Self::CreateRoute(_) | Self::ReplaceRoute(_))
    }

    /// Request body as a JSON object.
    pub fn fields(&self) -> Result<Value, ProvisionerError> {
        let value = match self {
            Self::CreateVpc(r) => serde_json::to_value(r)?,
            Self::CreateInternetGateway(r) => serde_json::to_value(r)?,
            Self::CreateRouteTable(r) => serde_json::to_value(r)?,
            Self::CreateNatGateway(r) => serde_json::to_value(r)?,
            Self::CreateRoute(r) | Self::ReplaceRoute(r) => serde_json::to_value(r)?,
        };
        Ok(value)
    }
}

/// What the target did with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOutcome {
    /// The provider reported the change as applied.
    pub applied: bool,
    pub id: Option<String>,
}

impl MutationOutcome {
    /// A provider may answer a mutation successfully yet decline to apply
    /// it. That is a failure of the task.
    pub fn ensure_applied(
        self,
        addr: &TaskAddr,
        operation: &'static str,
    ) -> Result<Self, ProvisionerError> {
        if self.applied {
            Ok(self)
        } else {
            Err(ProvisionerError::CloudApi {
                addr: addr.clone(),
                operation,
                message: "provider did not apply the request".into(),
            })
        }
    }
}

/// A condition a task needs before it can mutate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    NatGatewayAvailable { id: String },
}

impl Readiness {
    fn describe(&self) -> String {
        match self {
            Self::NatGatewayAvailable { id } => format!("NAT gateway {id}"),
        }
    }
}

/// Receives rendered changes.
pub trait Target: Send + Sync {
    fn mode(&self) -> TargetMode;

    fn apply<'a>(
        &'a self,
        addr: &'a TaskAddr,
        request: CloudRequest,
    ) -> BoxFuture<'a, Result<MutationOutcome, ProvisionerError>>;

    /// Block `addr` until `readiness` holds.
    fn await_ready<'a>(
        &'a self,
        addr: &'a TaskAddr,
        readiness: &'a Readiness,
    ) -> BoxFuture<'a, Result<(), ProvisionerError>>;
}

// ── Apply ────────────────────────────────────────────────────────────────────

/// Sends every request to the cloud.
pub struct ApplyTarget {
    cloud: Arc<dyn Cloud>,
    wait: WaitConfig,
}

impl ApplyTarget {
    pub fn new(cloud: Arc<dyn Cloud>, wait: WaitConfig) -> Self {
        Self { cloud, wait }
    }

    async fn send(
        &self,
        addr: &TaskAddr,
        request: &CloudRequest,
    ) -> Result<MutationOutcome, ProvisionerError> {
        let cloud = self.cloud.as_ref();
        let operation = request.operation();
        let api_err = |e| ProvisionerError::cloud_api(addr, operation, e);

        tracing::info!(addr = %addr, operation, "applying change");

        let outcome = match request {
            CloudRequest::CreateVpc(input) => {
                let api = require(cloud, Capability::Vpcs, cloud.vpcs())?;
                let vpc = api.create_vpc(input).await.map_err(api_err)?;
                MutationOutcome {
                    applied: true,
                    id: Some(vpc.id),
                }
            }
            CloudRequest::CreateInternetGateway(input) => {
                let api = require(cloud, Capability::InternetGateways, cloud.internet_gateways())?;
                let igw = api.create_internet_gateway(input).await.map_err(api_err)?;
                MutationOutcome {
                    applied: true,
                    id: Some(igw.id),
                }
            }
            CloudRequest::CreateRouteTable(input) => {
                let api = require(cloud, Capability::RouteTables, cloud.route_tables())?;
                let table = api.create_route_table(input).await.map_err(api_err)?;
                MutationOutcome {
                    applied: true,
                    id: Some(table.id),
                }
            }
            CloudRequest::CreateNatGateway(input) => {
                let api = require(cloud, Capability::NatGateways, cloud.nat_gateways())?;
                let nat = api.create_nat_gateway(input).await.map_err(api_err)?;
                MutationOutcome {
                    applied: true,
                    id: Some(nat.id),
                }
            }
            CloudRequest::CreateRoute(route) => {
                let api = require(cloud, Capability::Routes, cloud.routes())?;
                let mutation = api.create_route(route).await.map_err(api_err)?;
                MutationOutcome {
                    applied: mutation.applied,
                    id: None,
                }
            }
            CloudRequest::ReplaceRoute(route) => {
                let api = require(cloud, Capability::Routes, cloud.routes())?;
                let mutation = api.replace_route(route).await.map_err(api_err)?;
                MutationOutcome {
                    applied: mutation.applied,
                    id: None,
                }
            }
        };
        Ok(outcome)
    }

    async fn wait_for(&self, addr: &TaskAddr, readiness: &Readiness) -> Result<(), ProvisionerError> {
        let cloud = self.cloud.as_ref();
        let dependency = readiness.describe();

        match readiness {
            Readiness::NatGatewayAvailable { id } => {
                let api = require(cloud, Capability::NatGateways, cloud.nat_gateways())?;
                let filter = ResourceFilter::by_id(id.clone());
                let filter = &filter;
                poll_until(&self.wait, &dependency, "available", || async move {
                    let found = api
                        .describe_nat_gateways(filter)
                        .await
                        .map_err(|e| ProvisionerError::cloud_api(addr, "DescribeNatGateways", e))?;
                    let probe = match found.first().map(|nat| nat.state) {
                        Some(NatGatewayState::Available) => Probe::Ready,
                        Some(NatGatewayState::Pending) => Probe::Pending("pending".into()),
                        Some(state) => Probe::Failed(state.to_string()),
                        // Describe is eventually consistent right after creation.
                        None => Probe::Pending("not found".into()),
                    };
                    Ok(probe)
                })
                .await
            }
        }
    }
}

impl Target for ApplyTarget {
    fn mode(&self) -> TargetMode {
        TargetMode::Apply
    }

    fn apply<'a>(
        &'a self,
        addr: &'a TaskAddr,
        request: CloudRequest,
    ) -> BoxFuture<'a, Result<MutationOutcome, ProvisionerError>> {
        Box::pin(async move { self.send(addr, &request).await })
    }

    fn await_ready<'a>(
        &'a self,
        addr: &'a TaskAddr,
        readiness: &'a Readiness,
    ) -> BoxFuture<'a, Result<(), ProvisionerError>> {
        Box::pin(self.wait_for(addr, readiness))
    }
}

// ── Plan ─────────────────────────────────────────────────────────────────────

/// Records requests instead of sending them. Created objects get a
/// placeholder identifier so dependents can still resolve.
#[derive(Default)]
pub struct PlanTarget {
    records: Mutex<Vec<PlanRecord>>,
}

impl PlanTarget {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, Vec<PlanRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The recorded changes, ordered by `order` then address.
    pub fn to_plan(&self, order: &[TaskAddr]) -> Plan {
        Plan::from_records(self.records().clone(), order)
    }
}

impl Target for PlanTarget {
    fn mode(&self) -> TargetMode {
        TargetMode::Plan
    }

    fn apply<'a>(
        &'a self,
        addr: &'a TaskAddr,
        request: CloudRequest,
    ) -> BoxFuture<'a, Result<MutationOutcome, ProvisionerError>> {
        Box::pin(async move {
            let identifier = Plan::placeholder(addr);
            let record = PlanRecord {
                kind: addr.kind,
                name: addr.name.clone(),
                action: request.action(),
                operation: request.operation().to_string(),
                fields: request.fields()?,
                identifier: identifier.clone(),
            };
            tracing::debug!(addr = %addr, operation = request.operation(), "recorded planned change");
            self.records().push(record);

            Ok(MutationOutcome {
                applied: true,
                id: request.assigns_identifier().then_some(identifier),
            })
        })
    }

    fn await_ready<'a>(
        &'a self,
        addr: &'a TaskAddr,
        readiness: &'a Readiness,
    ) -> BoxFuture<'a, Result<(), ProvisionerError>> {
        Box::pin(async move {
            tracing::debug!(addr = %addr, dependency = %readiness.describe(), "not waiting in plan mode");
            Ok(())
        })
    }
}
