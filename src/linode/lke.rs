//! LKE cluster and node pool endpoints.

use tracing::{debug, info};

use crate::error::Result;

use super::client::ApiSession;
use super::types::{
    LkeApiEndpoint, LkeCluster, LkeClusterCreateRequest, LkeClusterUpdateRequest, LkeKubeconfig,
    LkeNodePool, LkeNodePoolCreateRequest, LkeNodePoolUpdateRequest,
};

fn cluster_path(id: u64) -> String {
    format!("/lke/clusters/{id}")
}

impl ApiSession<'_> {
    /// Creates a cluster with its initial pools.
    ///
    /// # Errors
    ///
    /// Returns an error if the API rejects the request.
    pub async fn create_lke_cluster(&self, request: &LkeClusterCreateRequest) -> Result<LkeCluster> {
        info!(
            "Creating LKE cluster '{}' ({} pool(s), k8s {})",
            request.label,
            request.node_pools.len(),
            request.k8s_version
        );
        self.post("/lke/clusters", request).await
    }

    /// Fetches a cluster.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the cluster is gone.
    pub async fn get_lke_cluster(&self, id: u64) -> Result<LkeCluster> {
        self.get(&cluster_path(id)).await
    }

    /// Updates cluster metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the API rejects the request.
    pub async fn update_lke_cluster(&self, id: u64, request: &LkeClusterUpdateRequest) -> Result<LkeCluster> {
        info!("Updating LKE cluster {id}");
        self.put(&cluster_path(id), request).await
    }

    /// Deletes a cluster.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if it is already gone.
    pub async fn delete_lke_cluster(&self, id: u64) -> Result<()> {
        info!("Deleting LKE cluster {id}");
        self.delete(&cluster_path(id)).await
    }

    /// Lists the pools of a cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn list_lke_pools(&self, id: u64) -> Result<Vec<LkeNodePool>> {
        self.list(&format!("{}/pools", cluster_path(id)), None).await
    }

    /// Adds a pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the API rejects the request.
    pub async fn create_lke_pool(&self, id: u64, request: &LkeNodePoolCreateRequest) -> Result<LkeNodePool> {
        info!(
            "Creating pool of {} x {} on LKE cluster {id}",
            request.count, request.plan_type
        );
        self.post(&format!("{}/pools", cluster_path(id)), request).await
    }

    /// Updates a pool in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the API rejects the request.
    pub async fn update_lke_pool(
        &self,
        id: u64,
        pool_id: u64,
        request: &LkeNodePoolUpdateRequest,
    ) -> Result<LkeNodePool> {
        info!("Updating pool {pool_id} on LKE cluster {id}");
        self.put(&format!("{}/pools/{pool_id}", cluster_path(id)), request)
            .await
    }

    /// Deletes a pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the API rejects the request.
    pub async fn delete_lke_pool(&self, id: u64, pool_id: u64) -> Result<()> {
        info!("Deleting pool {pool_id} on LKE cluster {id}");
        self.delete(&format!("{}/pools/{pool_id}", cluster_path(id)))
            .await
    }

    /// Fetches the kubeconfig.
    ///
    /// # Errors
    ///
    /// Returns a transient error while the cluster is still provisioning.
    /// The request is not retried.
    pub async fn get_lke_kubeconfig(&self, id: u64) -> Result<LkeKubeconfig> {
        debug!("Fetching kubeconfig of LKE cluster {id}");
        self.get_once(&format!("{}/kubeconfig", cluster_path(id))).await
    }

    /// Lists the API endpoints of a cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn list_lke_api_endpoints(&self, id: u64) -> Result<Vec<LkeApiEndpoint>> {
        self.list(&format!("{}/api-endpoints", cluster_path(id)), None)
            .await
    }
}
