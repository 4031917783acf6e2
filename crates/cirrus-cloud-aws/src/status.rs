//! Cluster status from ELBv2 (API ingress) and EC2 (control-plane instances).

use aws_sdk_ec2::types::{Filter, InstanceStateName};
use aws_sdk_elasticloadbalancingv2::types::{LoadBalancer, TagDescription};
use cirrus_cloud::model::{
    ApiIngressStatus, Cluster, ClusterStatus, CLUSTER_TAG, NAME_TAG, ROLE_TAG,
};
use cirrus_cloud::{format_err_chain, BoxFuture, CloudError, StatusApi};

use crate::AwsCloud;

pub const CONTROL_PLANE_ROLE: &str = "control-plane";

/// DescribeTags accepts at most this many ARNs per call.
const DESCRIBE_TAGS_BATCH: usize = 20;

/// `Name` tag carried by the load balancer fronting a cluster's API servers.
pub fn api_load_balancer_tag(cluster: &str) -> String {
    format!("api.{cluster}")
}

/// ARNs whose `Name` tag equals `name`.
pub fn arns_tagged_with_name<'a>(descriptions: &'a [TagDescription], name: &str) -> Vec<&'a str> {
    descriptions
        .iter()
        .filter(|d| {
            d.tags()
                .iter()
                .any(|t| t.key() == NAME_TAG && t.value() == Some(name))
        })
        .filter_map(|d| d.resource_arn())
        .collect()
}

impl AwsCloud {
    async fn list_load_balancers(&self) -> Result<Vec<LoadBalancer>, CloudError> {
        let mut load_balancers = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let resp = self
                .elb
                .describe_load_balancers()
                .set_marker(marker.clone())
                .send()
                .await
                .map_err(|e| {
                    CloudError::api(
                        "DescribeLoadBalancers",
                        format_err_chain(&e.into_service_error()),
                    )
                })?;

            load_balancers.extend(resp.load_balancers().iter().cloned());

            match resp.next_marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(load_balancers)
    }

    async fn describe_tags(&self, arns: &[String]) -> Result<Vec<TagDescription>, CloudError> {
        let mut descriptions = Vec::new();
        for batch in arns.chunks(DESCRIBE_TAGS_BATCH) {
            let resp = self
                .elb
                .describe_tags()
                .set_resource_arns(Some(batch.to_vec()))
                .send()
                .await
                .map_err(|e| {
                    CloudError::api("DescribeTags", format_err_chain(&e.into_service_error()))
                })?;
            descriptions.extend(resp.tag_descriptions().iter().cloned());
        }
        Ok(descriptions)
    }
}

impl StatusApi for AwsCloud {
    fn api_ingress_status<'a>(
        &'a self,
        cluster: &'a Cluster,
    ) -> BoxFuture<'a, Result<Vec<ApiIngressStatus>, CloudError>> {
        Box::pin(async move {
            let name = api_load_balancer_tag(&cluster.name);
            let load_balancers = self.list_load_balancers().await?;
            let arns: Vec<String> = load_balancers
                .iter()
                .filter_map(|lb| lb.load_balancer_arn())
                .map(String::from)
                .collect();

            let descriptions = self.describe_tags(&arns).await?;
            let matched = arns_tagged_with_name(&descriptions, &name);
            if matched.is_empty() {
                tracing::debug!(
                    name = %name,
                    scanned = load_balancers.len(),
                    "API load balancer not found"
                );
                return Ok(Vec::new());
            }

            load_balancers
                .iter()
                .filter(|lb| lb.load_balancer_arn().is_some_and(|arn| matched.contains(&arn)))
                .map(|lb| {
                    let hostname = lb.dns_name().ok_or_else(|| {
                        CloudError::api(
                            "DescribeLoadBalancers",
                            format!("load balancer {name} has no DNS name"),
                        )
                    })?;
                    Ok(ApiIngressStatus {
                        hostname: hostname.to_string(),
                    })
                })
                .collect()
        })
    }

    fn cluster_status<'a>(
        &'a self,
        cluster: &'a Cluster,
    ) -> BoxFuture<'a, Result<Option<ClusterStatus>, CloudError>> {
        Box::pin(async move {
            let resp = self
                .ec2
                .describe_instances()
                .filters(
                    Filter::builder()
                        .name(format!("tag:{CLUSTER_TAG}"))
                        .values(&cluster.name)
                        .build(),
                )
                .filters(
                    Filter::builder()
                        .name(format!("tag:{ROLE_TAG}"))
                        .values(CONTROL_PLANE_ROLE)
                        .build(),
                )
                .send()
                .await
                .map_err(|e| CloudError::api("DescribeInstances", format_err_chain(&e)))?;

            let states: Vec<Option<&InstanceStateName>> = resp
                .reservations()
                .iter()
                .flat_map(|r| r.instances())
                .map(|i| i.state().and_then(|s| s.name()))
                .filter(|state| {
                    !matches!(
                        state,
                        Some(InstanceStateName::Terminated | InstanceStateName::ShuttingDown)
                    )
                })
                .collect();

            if states.is_empty() {
                return Ok(None);
            }

            let running = states
                .iter()
                .filter(|s| matches!(s, Some(InstanceStateName::Running)))
                .count();
            Ok(Some(ClusterStatus {
                control_plane_instances: states.len(),
                control_plane_healthy: running == states.len(),
            }))
        })
    }
}
