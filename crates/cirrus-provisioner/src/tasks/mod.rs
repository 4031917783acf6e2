//! The concrete resource tasks.

pub mod internet_gateway;
pub mod nat_gateway;
pub mod route;
pub mod route_table;
pub mod vpc;

pub use internet_gateway::{InternetGateway, InternetGatewayState};
pub use nat_gateway::{NatGateway, NatGatewayState};
pub use route::{Route, RouteState, TargetRef};
pub use route_table::{RouteTable, RouteTableState};
pub use vpc::{Vpc, VpcState};

use cirrus_cloud::model::{ResourceFilter, Tags, NAME_TAG};

/// Tags every created object starts with.
fn name_tags(name: &str) -> Tags {
    Tags::from([(NAME_TAG.to_string(), name.to_string())])
}

/// Look up by identifier when one is known, otherwise by ownership tags.
fn lookup_filter(id: Option<&String>, tags: &Tags) -> ResourceFilter {
    match id {
        Some(id) => ResourceFilter::by_id(id.clone()),
        None => ResourceFilter::by_tags(tags.clone()),
    }
}
