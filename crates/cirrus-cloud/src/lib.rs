//! cirrus-cloud
//!
//! Cloud capability abstraction consumed by the provisioner.
//!
//! A backend implements [`Cloud`] and hands out one handle per resource
//! family it supports (VPCs, gateways, route tables, routes, status).
//! Callers ask for the handle they need and get an explicit
//! [`CloudError::Unsupported`] when it is missing.
//!
//! Backends:
//! - [`memory::MemoryCloud`]: in-process, records every call
//! - `cirrus-cloud-aws`: EC2 + ELBv2

pub mod capability;
pub mod error;
pub mod memory;
pub mod model;
pub mod status;

pub use crate::capability::{
    require, BoxFuture, Cloud, InternetGatewayApi, NatGatewayApi, RouteApi, RouteTableApi,
    StatusApi, VpcApi,
};
pub use crate::error::{format_err_chain, CloudError};
pub use crate::memory::{CloudCall, MemoryCloud};
pub use crate::model::{Capability, CloudKind, Cluster};
pub use crate::status::{CloudRegistry, StatusDiscovery};
