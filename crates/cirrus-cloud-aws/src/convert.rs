//! Translation between SDK shapes and `cirrus_cloud::model`.

use aws_sdk_ec2::types::{
    Filter, NatGateway, NatGatewayState as SdkNatGatewayState, ResourceType, Route,
    RouteState as SdkRouteState, Tag, TagSpecification,
};
use cirrus_cloud::model::{
    NatGatewayRecord, NatGatewayState, ResourceFilter, RouteRecord, RouteState, Tags,
};

pub fn tags_from_sdk(tags: &[Tag]) -> Tags {
    tags.iter()
        .filter_map(|t| Some((t.key()?.to_string(), t.value().unwrap_or_default().to_string())))
        .collect()
}

pub fn tag_specification(resource_type: ResourceType, tags: &Tags) -> TagSpecification {
    let tags = tags
        .iter()
        .map(|(k, v)| Tag::builder().key(k).value(v).build())
        .collect();
    TagSpecification::builder()
        .resource_type(resource_type)
        .set_tags(Some(tags))
        .build()
}

/// One `tag:<key>` filter per required tag.
pub fn tag_filters(filter: &ResourceFilter) -> Vec<Filter> {
    filter
        .tags
        .iter()
        .map(|(k, v)| Filter::builder().name(format!("tag:{k}")).values(v).build())
        .collect()
}

/// `None` when the filter names no ids, so the SDK lists by filters only.
pub fn ids(filter: &ResourceFilter) -> Option<Vec<String>> {
    (!filter.ids.is_empty()).then(|| filter.ids.clone())
}

pub fn nat_gateway_state(state: Option<&SdkNatGatewayState>) -> NatGatewayState {
    match state {
        Some(SdkNatGatewayState::Available) => NatGatewayState::Available,
        Some(SdkNatGatewayState::Failed) => NatGatewayState::Failed,
        Some(SdkNatGatewayState::Deleting) => NatGatewayState::Deleting,
        Some(SdkNatGatewayState::Deleted) => NatGatewayState::Deleted,
        // Pending, or a state this SDK doesn't know yet.
        _ => NatGatewayState::Pending,
    }
}

pub fn nat_gateway_record(nat: &NatGateway) -> Option<NatGatewayRecord> {
    Some(NatGatewayRecord {
        id: nat.nat_gateway_id()?.to_string(),
        subnet_id: nat.subnet_id().unwrap_or_default().to_string(),
        allocation_id: nat
            .nat_gateway_addresses()
            .iter()
            .find_map(|a| a.allocation_id())
            .map(str::to_string),
        state: nat_gateway_state(nat.state()),
        tags: tags_from_sdk(nat.tags()),
    })
}

pub fn route_record(route_table_id: &str, route: &Route) -> Option<RouteRecord> {
    let state = match route.state() {
        Some(SdkRouteState::Blackhole) => RouteState::Blackhole,
        _ => RouteState::Active,
    };
    Some(RouteRecord {
        route_table_id: route_table_id.to_string(),
        destination_cidr_block: route.destination_cidr_block()?.to_string(),
        // Local routes report gateway "local"; they are never ours.
        gateway_id: route
            .gateway_id()
            .filter(|id| *id != "local")
            .map(str::to_string),
        nat_gateway_id: route.nat_gateway_id().map(str::to_string),
        state,
    })
}
