//! EC2 networking capabilities.

use aws_sdk_ec2::types::ResourceType;
use cirrus_cloud::model::{
    CreateInternetGateway, CreateNatGateway, CreateRouteTable, CreateVpc, InternetGatewayRecord,
    NatGatewayRecord, ResourceFilter, RouteFilter, RouteMutation, RouteRecord, RouteRequest,
    RouteTableRecord, RouteTarget, VpcRecord,
};
use cirrus_cloud::{
    format_err_chain, BoxFuture, CloudError, InternetGatewayApi, NatGatewayApi, RouteApi,
    RouteTableApi, VpcApi,
};

use crate::convert::{
    ids, nat_gateway_record, route_record, tag_filters, tag_specification, tags_from_sdk,
};
use crate::AwsCloud;

fn api_error(operation: &'static str, err: &dyn std::error::Error) -> CloudError {
    CloudError::api(operation, format_err_chain(err))
}

fn missing(operation: &'static str, what: &str) -> CloudError {
    CloudError::api(operation, format!("response did not include {what}"))
}

impl VpcApi for AwsCloud {
    fn describe_vpcs<'a>(
        &'a self,
        filter: &'a ResourceFilter,
    ) -> BoxFuture<'a, Result<Vec<VpcRecord>, CloudError>> {
        Box::pin(async move {
            let resp = self
                .ec2
                .describe_vpcs()
                .set_vpc_ids(ids(filter))
                .set_filters(Some(tag_filters(filter)))
                .send()
                .await
                .map_err(|e| api_error("DescribeVpcs", &e))?;

            Ok(resp
                .vpcs()
                .iter()
                .filter_map(|vpc| {
                    Some(VpcRecord {
                        id: vpc.vpc_id()?.to_string(),
                        cidr_block: vpc.cidr_block().unwrap_or_default().to_string(),
                        tags: tags_from_sdk(vpc.tags()),
                    })
                })
                .collect())
        })
    }

    fn create_vpc<'a>(
        &'a self,
        input: &'a CreateVpc,
    ) -> BoxFuture<'a, Result<VpcRecord, CloudError>> {
        Box::pin(async move {
            let resp = self
                .ec2
                .create_vpc()
                .cidr_block(&input.cidr_block)
                .tag_specifications(tag_specification(ResourceType::Vpc, &input.tags))
                .send()
                .await
                .map_err(|e| api_error("CreateVpc", &e))?;

            let id = resp
                .vpc()
                .and_then(|v| v.vpc_id())
                .ok_or_else(|| missing("CreateVpc", "a VPC id"))?;
            tracing::info!(vpc_id = %id, region = %self.region, "created VPC");

            Ok(VpcRecord {
                id: id.to_string(),
                cidr_block: input.cidr_block.clone(),
                tags: input.tags.clone(),
            })
        })
    }
}

impl InternetGatewayApi for AwsCloud {
    fn describe_internet_gateways<'a>(
        &'a self,
        filter: &'a ResourceFilter,
    ) -> BoxFuture<'a, Result<Vec<InternetGatewayRecord>, CloudError>> {
        Box::pin(async move {
            let resp = self
                .ec2
                .describe_internet_gateways()
                .set_internet_gateway_ids(ids(filter))
                .set_filters(Some(tag_filters(filter)))
                .send()
                .await
                .map_err(|e| api_error("DescribeInternetGateways", &e))?;

            Ok(resp
                .internet_gateways()
                .iter()
                .filter_map(|igw| {
                    Some(InternetGatewayRecord {
                        id: igw.internet_gateway_id()?.to_string(),
                        vpc_id: igw
                            .attachments()
                            .iter()
                            .find_map(|a| a.vpc_id())
                            .map(str::to_string),
                        tags: tags_from_sdk(igw.tags()),
                    })
                })
                .collect())
        })
    }

    fn create_internet_gateway<'a>(
        &'a self,
        input: &'a CreateInternetGateway,
    ) -> BoxFuture<'a, Result<InternetGatewayRecord, CloudError>> {
        Box::pin(async move {
            let resp = self
                .ec2
                .create_internet_gateway()
                .tag_specifications(tag_specification(ResourceType::InternetGateway, &input.tags))
                .send()
                .await
                .map_err(|e| api_error("CreateInternetGateway", &e))?;

            let id = resp
                .internet_gateway()
                .and_then(|g| g.internet_gateway_id())
                .ok_or_else(|| missing("CreateInternetGateway", "an internet gateway id"))?
                .to_string();

            self.ec2
                .attach_internet_gateway()
                .internet_gateway_id(&id)
                .vpc_id(&input.vpc_id)
                .send()
                .await
                .map_err(|e| api_error("AttachInternetGateway", &e))?;
            tracing::info!(internet_gateway_id = %id, vpc_id = %input.vpc_id, "created and attached internet gateway");

            Ok(InternetGatewayRecord {
                id,
                vpc_id: Some(input.vpc_id.clone()),
                tags: input.tags.clone(),
            })
        })
    }
}

impl RouteTableApi for AwsCloud {
    fn describe_route_tables<'a>(
        &'a self,
        filter: &'a ResourceFilter,
    ) -> BoxFuture<'a, Result<Vec<RouteTableRecord>, CloudError>> {
        Box::pin(async move {
            let resp = self
                .ec2
                .describe_route_tables()
                .set_route_table_ids(ids(filter))
                .set_filters(Some(tag_filters(filter)))
                .send()
                .await
                .map_err(|e| api_error("DescribeRouteTables", &e))?;

            Ok(resp
                .route_tables()
                .iter()
                .filter_map(|table| {
                    Some(RouteTableRecord {
                        id: table.route_table_id()?.to_string(),
                        vpc_id: table.vpc_id().unwrap_or_default().to_string(),
                        tags: tags_from_sdk(table.tags()),
                    })
                })
                .collect())
        })
    }

    fn create_route_table<'a>(
        &'a self,
        input: &'a CreateRouteTable,
    ) -> BoxFuture<'a, Result<RouteTableRecord, CloudError>> {
        Box::pin(async move {
            let resp = self
                .ec2
                .create_route_table()
                .vpc_id(&input.vpc_id)
                .tag_specifications(tag_specification(ResourceType::RouteTable, &input.tags))
                .send()
                .await
                .map_err(|e| api_error("CreateRouteTable", &e))?;

            let id = resp
                .route_table()
                .and_then(|t| t.route_table_id())
                .ok_or_else(|| missing("CreateRouteTable", "a route table id"))?;
            tracing::info!(route_table_id = %id, vpc_id = %input.vpc_id, "created route table");

            Ok(RouteTableRecord {
                id: id.to_string(),
                vpc_id: input.vpc_id.clone(),
                tags: input.tags.clone(),
            })
        })
    }
}

impl NatGatewayApi for AwsCloud {
    fn describe_nat_gateways<'a>(
        &'a self,
        filter: &'a ResourceFilter,
    ) -> BoxFuture<'a, Result<Vec<NatGatewayRecord>, CloudError>> {
        Box::pin(async move {
            // DescribeNatGateways spells its filter parameter in the singular.
            let resp = self
                .ec2
                .describe_nat_gateways()
                .set_nat_gateway_ids(ids(filter))
                .set_filter(Some(tag_filters(filter)))
                .send()
                .await
                .map_err(|e| api_error("DescribeNatGateways", &e))?;

            Ok(resp
                .nat_gateways()
                .iter()
                .filter_map(nat_gateway_record)
                .collect())
        })
    }

    fn create_nat_gateway<'a>(
        &'a self,
        input: &'a CreateNatGateway,
    ) -> BoxFuture<'a, Result<NatGatewayRecord, CloudError>> {
        Box::pin(async move {
            let resp = self
                .ec2
                .create_nat_gateway()
                .subnet_id(&input.subnet_id)
                .allocation_id(&input.allocation_id)
                .tag_specifications(tag_specification(ResourceType::Natgateway, &input.tags))
                .send()
                .await
                .map_err(|e| api_error("CreateNatGateway", &e))?;

            let record = resp
                .nat_gateway()
                .and_then(nat_gateway_record)
                .ok_or_else(|| missing("CreateNatGateway", "a NAT gateway"))?;
            tracing::info!(
                nat_gateway_id = %record.id,
                subnet_id = %input.subnet_id,
                state = %record.state,
                "created NAT gateway"
            );
            Ok(record)
        })
    }
}

impl RouteApi for AwsCloud {
    fn describe_routes<'a>(
        &'a self,
        filter: &'a RouteFilter,
    ) -> BoxFuture<'a, Result<Vec<RouteRecord>, CloudError>> {
        Box::pin(async move {
            let resp = self
                .ec2
                .describe_route_tables()
                .route_table_ids(&filter.route_table_id)
                .send()
                .await
                .map_err(|e| api_error("DescribeRoutes", &e))?;

            Ok(resp
                .route_tables()
                .iter()
                .flat_map(|table| table.routes())
                .filter_map(|route| route_record(&filter.route_table_id, route))
                .filter(|r| r.destination_cidr_block == filter.destination_cidr_block)
                .collect())
        })
    }

    fn create_route<'a>(
        &'a self,
        request: &'a RouteRequest,
    ) -> BoxFuture<'a, Result<RouteMutation, CloudError>> {
        Box::pin(async move {
            let builder = self
                .ec2
                .create_route()
                .route_table_id(&request.route_table_id)
                .destination_cidr_block(&request.destination_cidr_block);
            let builder = match &request.target {
                RouteTarget::Gateway(id) => builder.gateway_id(id),
                RouteTarget::NatGateway(id) => builder.nat_gateway_id(id),
            };
            let resp = builder
                .send()
                .await
                .map_err(|e| api_error("CreateRoute", &e))?;

            Ok(RouteMutation {
                applied: resp.r#return().unwrap_or(false),
            })
        })
    }

    fn replace_route<'a>(
        &'a self,
        request: &'a RouteRequest,
    ) -> BoxFuture<'a, Result<RouteMutation, CloudError>> {
        Box::pin(async move {
            let builder = self
                .ec2
                .replace_route()
                .route_table_id(&request.route_table_id)
                .destination_cidr_block(&request.destination_cidr_block);
            let builder = match &request.target {
                RouteTarget::Gateway(id) => builder.gateway_id(id),
                RouteTarget::NatGateway(id) => builder.nat_gateway_id(id),
            };
            builder
                .send()
                .await
                .map_err(|e| api_error("ReplaceRoute", &e))?;

            // ReplaceRoute has no result flag; success means applied.
            Ok(RouteMutation { applied: true })
        })
    }
}
