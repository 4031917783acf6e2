//! Cluster status discovery by inspecting cloud objects.

use std::collections::HashMap;
use std::sync::Arc;

use crate::capability::Cloud;
use crate::error::CloudError;
use crate::model::{ApiIngressStatus, CloudKind, Cluster, ClusterStatus};

/// Cloud providers available to this process, keyed by backend.
#[derive(Default, Clone)]
pub struct CloudRegistry {
    clouds: HashMap<CloudKind, Arc<dyn Cloud>>,
}

impl CloudRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, cloud: Arc<dyn Cloud>) {
        self.clouds.insert(cloud.kind(), cloud);
    }

    pub fn get(&self, kind: CloudKind) -> Result<Arc<dyn Cloud>, CloudError> {
        self.clouds
            .get(&kind)
            .cloned()
            .ok_or(CloudError::NoProvider(kind))
    }
}

/// Answers status queries for a cluster by dispatching to the provider
/// that backs it.
pub struct StatusDiscovery {
    registry: CloudRegistry,
}

impl StatusDiscovery {
    pub fn new(registry: CloudRegistry) -> Self {
        Self { registry }
    }

    /// Hostnames through which the cluster's API is reachable.
    pub async fn get_api_ingress_status(
        &self,
        cluster: &Cluster,
    ) -> Result<Vec<ApiIngressStatus>, CloudError> {
        let cloud = self.registry.get(cluster.cloud)?;
        let Some(status) = cloud.status() else {
            return Err(CloudError::NotImplemented {
                what: "API ingress status",
                backend: cloud.kind(),
            });
        };
        let ingresses = status.api_ingress_status(cluster).await?;
        tracing::debug!(
            cluster = %cluster.name,
            backend = %cloud.kind(),
            count = ingresses.len(),
            "discovered API ingress"
        );
        Ok(ingresses)
    }

    /// Control-plane status, or `None` when the cloud holds nothing for
    /// this cluster.
    pub async fn find_cluster_status(
        &self,
        cluster: &Cluster,
    ) -> Result<Option<ClusterStatus>, CloudError> {
        let cloud = self.registry.get(cluster.cloud)?;
        let Some(status) = cloud.status() else {
            return Err(CloudError::NotImplemented {
                what: "cluster status",
                backend: cloud.kind(),
            });
        };
        status.cluster_status(cluster).await
    }
}
