//! cirrus-cloud-aws
//!
//! AWS backend for `cirrus-cloud`: VPCs, internet gateways, route tables,
//! NAT gateways and routes through EC2, cluster status through ELBv2 and
//! EC2 instances.

pub mod convert;
mod ec2;
pub mod status;

use cirrus_cloud::{
    Cloud, CloudKind, InternetGatewayApi, NatGatewayApi, RouteApi, RouteTableApi, StatusApi,
    VpcApi,
};

pub use crate::status::{api_load_balancer_tag, arns_tagged_with_name};

pub struct AwsCloud {
    region: String,
    ec2: aws_sdk_ec2::Client,
    elb: aws_sdk_elasticloadbalancingv2::Client,
}

impl AwsCloud {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        let region = config
            .region()
            .map(|r| r.to_string())
            .unwrap_or_default();
        Self {
            region,
            ec2: aws_sdk_ec2::Client::new(config),
            elb: aws_sdk_elasticloadbalancingv2::Client::new(config),
        }
    }

    /// Load credentials from the default chain for `region`.
    pub async fn from_env(region: &str) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;
        Self::new(&config)
    }
}

impl Cloud for AwsCloud {
    fn kind(&self) -> CloudKind {
        CloudKind::Aws
    }

    fn region(&self) -> &str {
        &self.region
    }

    fn vpcs(&self) -> Option<&dyn VpcApi> {
        Some(self)
    }

    fn internet_gateways(&self) -> Option<&dyn InternetGatewayApi> {
        Some(self)
    }

    fn route_tables(&self) -> Option<&dyn RouteTableApi> {
        Some(self)
    }

    fn nat_gateways(&self) -> Option<&dyn NatGatewayApi> {
        Some(self)
    }

    fn routes(&self) -> Option<&dyn RouteApi> {
        Some(self)
    }

    fn status(&self) -> Option<&dyn StatusApi> {
        Some(self)
    }
}
